use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineError;

#[derive(Error, Debug)]
pub enum StemsepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: String, value: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Pre-processing rejections. Surfaced to the caller before any heavy work
/// and, for the extension/size/model checks, before any resource allocation.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("file size ({actual_mb:.1}MB) exceeds limit ({limit_mb}MB)")]
    FileTooLarge { actual_mb: f64, limit_mb: u64 },

    #[error("unsupported format '{extension}'")]
    UnsupportedFormat { extension: String },

    #[error("invalid content type '{content_type}'")]
    InvalidContentType { content_type: String },

    #[error("audio duration ({actual:.1}s) exceeds {limit}s limit")]
    DurationExceeded { actual: f64, limit: u64 },

    #[error("audio has {channels} channels, maximum 2 supported")]
    TooManyChannels { channels: u16 },

    #[error("unknown model '{model}'")]
    UnknownModel { model: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("job '{0}' not found")]
    JobNotFound(String),

    #[error("stem '{stem}' not found for job '{job_id}'")]
    StemNotFound { job_id: String, stem: String },
}

/// Boundary error reported by [`crate::service::StemService`]. Collapses the
/// module errors into the four categories callers can act on.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(String),

    #[error("stem separation failed: {0}")]
    Processing(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        ServiceError::NotFound(err.to_string())
    }
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(v) => ServiceError::Validation(v),
            other => ServiceError::Processing(other.to_string()),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StemsepError>;
