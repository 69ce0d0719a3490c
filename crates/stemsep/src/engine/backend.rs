//! Separation engine abstraction. The engine itself is a black box: it takes
//! a normalized stereo waveform and produces named stems.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::error::ValidationError;

/// Interleaved stereo samples (L, R, L, R, ...).
#[derive(Debug, Clone)]
pub struct StereoWaveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoWaveform {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// One isolated source track produced by separation, interleaved stereo.
#[derive(Debug, Clone)]
pub struct Stem {
    pub label: String,
    pub samples: Vec<f32>,
}

/// The external separation computation. Implementations are expected to be
/// slow and blocking; the adapter always invokes them off the request path.
pub trait SeparationEngine: Send + Sync {
    fn model(&self) -> &str;

    fn separate(&self, waveform: &StereoWaveform) -> Result<Vec<Stem>, EngineError>;
}

/// Constructs engines for a model selector. Loading is blocking and
/// potentially slow (model download / weight load), so the adapter calls it
/// on a blocking worker thread.
pub trait EngineFactory: Send + Sync {
    fn load(&self, model: &str) -> Result<Arc<dyn SeparationEngine>, EngineError>;
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to load engine for model '{model}': {reason}")]
    LoadFailed { model: String, reason: String },

    #[error("failed to decode audio '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("separation failed: {0}")]
    SeparationFailed(String),

    #[error("failed to create output directory '{path}': {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write stem '{path}': {source}")]
    WriteArtifact {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("engine task failed: {0}")]
    Task(String),
}
