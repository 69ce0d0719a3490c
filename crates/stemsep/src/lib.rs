pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod service;
pub mod stats;
pub mod storage;
pub mod sweeper;
pub mod worker;

pub use config::{load_settings_from_env, Settings};
pub use engine::{
    EngineError, EngineFactory, SeparationEngine, SeparationEngineAdapter, Stem, StereoWaveform,
};
pub use error::{
    ConfigError, RegistryError, Result, ServiceError, StemsepError, StorageError, ValidationError,
};
pub use registry::{JobListing, JobRegistry, JobStatus, JobSummary, JobView};
pub use service::{
    CleanupReport, HealthReport, StemDownload, StemService, SubmitRequest, SubmitResponse,
};
pub use stats::{StatsCollector, SystemStats};
pub use storage::{ResourceAllocator, TempResource};
pub use sweeper::{ReclamationSweeper, SweepReport};
pub use worker::{ConcurrencyGate, GatePermit};
