//! Service facade implementing the request/response contract: submit,
//! status, download, listing, cleanup, and health. Protocol wiring (HTTP or
//! otherwise) lives outside this crate; handlers call these methods.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Settings;
use crate::engine::{EngineFactory, SeparationEngineAdapter};
use crate::error::{ServiceError, StorageError, ValidationError};
use crate::registry::{JobListing, JobRegistry, JobStatus, JobView};
use crate::stats::{StatsCollector, SystemStats};
use crate::storage::ResourceAllocator;
use crate::sweeper::{ReclamationSweeper, SweepReport, MANUAL_SWEEP_TTL};
use crate::worker::ConcurrencyGate;

/// One upload to separate.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub bytes: Vec<u8>,
    pub filename: String,
    /// Model selector; falls back to the configured default.
    pub model: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
    /// Stem label -> download reference.
    pub stems: BTreeMap<String, String>,
    pub processing_time_seconds: f64,
    pub file_sizes: BTreeMap<String, u64>,
    pub message: String,
}

/// Bytes of one separated stem, ready to serve.
#[derive(Debug, Clone)]
pub struct StemDownload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub message: String,
    pub expired_jobs_cleaned: usize,
    pub remaining_jobs: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub system_stats: SystemStats,
    pub active_jobs: usize,
}

/// Owns every moving part of the separation pipeline. Constructed once at
/// application startup and shared by handle; no global state.
pub struct StemService {
    settings: Settings,
    registry: Arc<JobRegistry>,
    allocator: Arc<ResourceAllocator>,
    gate: ConcurrencyGate,
    adapter: SeparationEngineAdapter,
    sweeper: Arc<ReclamationSweeper>,
    stats: StatsCollector,
}

impl StemService {
    pub fn new(
        settings: Settings,
        factory: Arc<dyn EngineFactory>,
    ) -> crate::error::Result<Self> {
        settings.validate()?;

        let registry = Arc::new(JobRegistry::new());
        let allocator = Arc::new(ResourceAllocator::new(&settings.temp_dir_base)?);
        let gate = ConcurrencyGate::new(settings.max_concurrent_jobs);
        let adapter = SeparationEngineAdapter::new(factory, &settings);
        let sweeper = Arc::new(ReclamationSweeper::new(
            Arc::clone(&registry),
            Arc::clone(&allocator),
            settings.sweep_interval(),
            settings.completed_job_ttl(),
            settings.temp_dir_max_size_bytes(),
        ));
        let stats = StatsCollector::new(&settings.temp_dir_base);

        Ok(Self {
            settings,
            registry,
            allocator,
            gate,
            adapter,
            sweeper,
            stats,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Starts the background reclamation loop. Call once at startup.
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        Arc::clone(&self.sweeper).spawn()
    }

    /// Runs one sweep synchronously with an explicit TTL. Exists for
    /// embedders and tests that need deterministic reclamation.
    pub fn sweep_once(&self, ttl: Duration) -> SweepReport {
        self.sweeper.run_once(ttl)
    }

    /// Accepts an upload, runs it through the separation engine, and
    /// returns the completed job. Validation failures reject the request
    /// before any temp storage is allocated.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse, ServiceError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.settings.default_model.clone());

        self.validate_request(&request, &model)?;

        let job_id = self.registry.create(&request.filename);
        log::info!(
            "Starting separation job {} for file '{}' (model '{}')",
            job_id,
            request.filename,
            model
        );

        let resource = match self.allocator.allocate(&job_id) {
            Ok(resource) => resource,
            Err(e) => {
                self.registry.remove(&job_id);
                return Err(e.into());
            }
        };

        // Stage the upload under the original name, path components stripped.
        let staged_name = Path::new(&request.filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("uploaded_audio")
            .to_string();
        let input_path = resource.path().join(&staged_name);
        let output_dir = resource.path().join("output");

        if let Err(e) = tokio::fs::write(&input_path, &request.bytes).await {
            let mut resource = resource;
            self.allocator.release(&mut resource);
            self.registry.remove(&job_id);
            return Err(StorageError::WriteFile {
                path: input_path,
                source: e,
            }
            .into());
        }

        self.registry
            .attach_resource(&job_id, resource)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        self.registry
            .mark_processing(&job_id)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let started = Instant::now();

        // The gate bounds only the heavy phase; staging above runs ungated.
        let permit = self.gate.acquire().await;
        let result = self.adapter.run(&input_path, &output_dir, &model).await;
        drop(permit);

        match result {
            Ok(artifacts) => {
                let processing_time = started.elapsed().as_secs_f64();

                let mut file_sizes = BTreeMap::new();
                for (label, path) in &artifacts {
                    let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                    file_sizes.insert(label.clone(), len);
                }

                let stems: BTreeMap<String, String> = artifacts
                    .keys()
                    .map(|label| (label.clone(), format!("/download/{}/{}", job_id, label)))
                    .collect();

                self.registry
                    .mark_completed(&job_id, artifacts, file_sizes.clone(), processing_time)
                    .map_err(|e| ServiceError::Internal(e.to_string()))?;

                log::info!("Job {} completed in {:.2}s", job_id, processing_time);

                Ok(SubmitResponse {
                    job_id,
                    status: JobStatus::Completed,
                    message: format!("Successfully separated {} stems", stems.len()),
                    stems,
                    processing_time_seconds: processing_time,
                    file_sizes,
                })
            }
            Err(e) => {
                // Failures leave no record behind; the caller gets the error
                // and the id stops resolving.
                log::error!("Job {} failed: {}", job_id, e);
                if let Some(mut resource) = self.registry.mark_failed(&job_id) {
                    self.allocator.release(&mut resource);
                }
                Err(e.into())
            }
        }
    }

    pub fn status(&self, job_id: &str) -> Result<JobView, ServiceError> {
        Ok(self.registry.get(job_id)?)
    }

    pub async fn download(&self, job_id: &str, stem: &str) -> Result<StemDownload, ServiceError> {
        let path = self.registry.artifact_path(job_id, stem)?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ServiceError::NotFound(format!(
                    "artifact for stem '{}' of job '{}' is no longer available",
                    stem, job_id
                )));
            }
            Err(e) => return Err(ServiceError::Internal(e.to_string())),
        };

        let content_type = mime_guess::from_path(&path)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "audio/wav".to_string());

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("stem.wav")
            .to_string();

        Ok(StemDownload {
            bytes,
            content_type,
            filename,
        })
    }

    pub fn list_jobs(&self) -> JobListing {
        self.registry.list()
    }

    /// Manually runs the sweeper's two passes with a shorter TTL than the
    /// periodic cycle.
    pub async fn trigger_cleanup(&self) -> Result<CleanupReport, ServiceError> {
        let sweeper = Arc::clone(&self.sweeper);
        let report = tokio::task::spawn_blocking(move || sweeper.run_once(MANUAL_SWEEP_TTL))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        Ok(CleanupReport {
            message: "Cleanup completed".to_string(),
            expired_jobs_cleaned: report.expired_jobs,
            remaining_jobs: report.remaining_jobs,
        })
    }

    pub async fn health(&self) -> Result<HealthReport, ServiceError> {
        let collector = self.stats.clone();
        let system_stats = tokio::task::spawn_blocking(move || collector.snapshot())
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        Ok(HealthReport {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            system_stats,
            active_jobs: self.registry.active_count(),
        })
    }

    fn validate_request(
        &self,
        request: &SubmitRequest,
        model: &str,
    ) -> Result<(), ValidationError> {
        if !self.settings.is_available_model(model) {
            return Err(ValidationError::UnknownModel {
                model: model.to_string(),
            });
        }

        if !self.settings.is_supported_filename(&request.filename) {
            let extension = Path::new(&request.filename)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e.to_lowercase()))
                .unwrap_or_else(|| "(none)".to_string());
            return Err(ValidationError::UnsupportedFormat { extension });
        }

        if let Some(content_type) = &request.content_type {
            if !content_type.starts_with("audio/") {
                return Err(ValidationError::InvalidContentType {
                    content_type: content_type.clone(),
                });
            }
        }

        let size = request.bytes.len() as u64;
        if size > self.settings.max_file_size_bytes() {
            return Err(ValidationError::FileTooLarge {
                actual_mb: size as f64 / (1024.0 * 1024.0),
                limit_mb: self.settings.max_file_size_mb,
            });
        }

        Ok(())
    }
}
