use std::path::PathBuf;
use std::str::FromStr;

use crate::config::schema::Settings;
use crate::error::ConfigError;

/// Builds [`Settings`] from environment variables, falling back to defaults
/// for anything unset. Recognized variables mirror the configuration surface:
/// `MAX_FILE_SIZE_MB`, `MAX_AUDIO_DURATION_SECONDS`, `TEMP_DIR_BASE`,
/// `CLEANUP_INTERVAL_HOURS`, `SWEEP_INTERVAL_SECONDS`, `TEMP_DIR_MAX_SIZE_GB`,
/// `DEFAULT_MODEL`, `MAX_CONCURRENT_JOBS`, `WORKER_TIMEOUT_SECONDS`.
pub fn load_settings_from_env() -> Result<Settings, ConfigError> {
    let mut settings = Settings::default();

    if let Some(v) = parse_env::<u64>("MAX_FILE_SIZE_MB")? {
        settings.max_file_size_mb = v;
    }
    if let Some(v) = parse_env::<u64>("MAX_AUDIO_DURATION_SECONDS")? {
        settings.max_audio_duration_seconds = v;
    }
    if let Some(v) = read_env("TEMP_DIR_BASE") {
        settings.temp_dir_base = PathBuf::from(v);
    }
    if let Some(v) = parse_env::<u64>("CLEANUP_INTERVAL_HOURS")? {
        settings.cleanup_interval_hours = v;
    }
    if let Some(v) = parse_env::<u64>("SWEEP_INTERVAL_SECONDS")? {
        settings.sweep_interval_seconds = v;
    }
    if let Some(v) = parse_env::<u64>("TEMP_DIR_MAX_SIZE_GB")? {
        settings.temp_dir_max_size_gb = v;
    }
    if let Some(v) = read_env("DEFAULT_MODEL") {
        settings.default_model = v;
    }
    if let Some(v) = parse_env::<usize>("MAX_CONCURRENT_JOBS")? {
        settings.max_concurrent_jobs = v;
    }
    if let Some(v) = parse_env::<u64>("WORKER_TIMEOUT_SECONDS")? {
        settings.worker_timeout_seconds = v;
    }

    settings.validate()?;

    Ok(settings)
}

fn read_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match read_env(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value,
            }),
        None => Ok(None),
    }
}
