use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_max_audio_duration_seconds")]
    pub max_audio_duration_seconds: u64,
    #[serde(default = "default_temp_dir_base")]
    pub temp_dir_base: PathBuf,
    /// Completed-job time-to-live, in hours. Jobs older than this are
    /// reclaimed by the background sweeper.
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u64,
    /// How often the background sweeper wakes up.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    /// Advisory ceiling for the temp storage root. Usage above this is
    /// reported by the sweeper but allocation is not blocked.
    #[serde(default = "default_temp_dir_max_size_gb")]
    pub temp_dir_max_size_gb: u64,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_available_models")]
    pub available_models: Vec<String>,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Advisory per-job budget. Parsed and exposed, but no enforcement point
    /// exists: an in-flight separation is never cancelled.
    #[serde(default = "default_worker_timeout_seconds")]
    pub worker_timeout_seconds: u64,
    #[serde(default = "default_supported_formats")]
    pub supported_formats: Vec<String>,
}

fn default_max_file_size_mb() -> u64 {
    100
}

fn default_max_audio_duration_seconds() -> u64 {
    600
}

fn default_temp_dir_base() -> PathBuf {
    PathBuf::from("/tmp/audio_processing")
}

fn default_cleanup_interval_hours() -> u64 {
    2
}

fn default_sweep_interval_seconds() -> u64 {
    3600
}

fn default_temp_dir_max_size_gb() -> u64 {
    1
}

fn default_model() -> String {
    "2stems-16kHz".to_string()
}

fn default_available_models() -> Vec<String> {
    vec![
        "2stems-16kHz".to_string(),
        "4stems-16kHz".to_string(),
        "5stems-16kHz".to_string(),
    ]
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_worker_timeout_seconds() -> u64 {
    300
}

fn default_supported_formats() -> Vec<String> {
    [".mp3", ".wav", ".flac", ".m4a", ".aac", ".ogg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
            max_audio_duration_seconds: default_max_audio_duration_seconds(),
            temp_dir_base: default_temp_dir_base(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            temp_dir_max_size_gb: default_temp_dir_max_size_gb(),
            default_model: default_model(),
            available_models: default_available_models(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            worker_timeout_seconds: default_worker_timeout_seconds(),
            supported_formats: default_supported_formats(),
        }
    }
}

impl Settings {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn completed_job_ttl(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours * 3600)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn temp_dir_max_size_bytes(&self) -> u64 {
        self.temp_dir_max_size_gb * 1024 * 1024 * 1024
    }

    /// Checks the filename extension against the supported format set.
    /// Matching is case-insensitive on the extension.
    pub fn is_supported_filename(&self, filename: &str) -> bool {
        match Path::new(filename).extension().and_then(|e| e.to_str()) {
            Some(ext) => {
                let dotted = format!(".{}", ext.to_lowercase());
                self.supported_formats.iter().any(|f| f == &dotted)
            }
            None => false,
        }
    }

    pub fn is_available_model(&self, model: &str) -> bool {
        self.available_models.iter().any(|m| m == model)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Validation {
                message: "max_concurrent_jobs must be greater than 0".to_string(),
            });
        }

        if self.available_models.is_empty() {
            return Err(ConfigError::Validation {
                message: "available_models must not be empty".to_string(),
            });
        }

        if !self.is_available_model(&self.default_model) {
            return Err(ConfigError::Validation {
                message: format!(
                    "default_model '{}' is not in available_models",
                    self.default_model
                ),
            });
        }

        if self.max_file_size_mb == 0 {
            return Err(ConfigError::Validation {
                message: "max_file_size_mb must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}
