use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::TempResource;

/// Lifecycle state of a job. Transitions are strictly
/// `Pending -> Processing -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Authoritative job record. Owns the job's temp resource while the job is
/// live; the resource leaves the record only to be released.
#[derive(Debug)]
pub struct JobRecord {
    pub id: String,
    pub filename: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Stem label -> artifact path. Non-empty exactly when `Completed`.
    pub artifacts: BTreeMap<String, PathBuf>,
    pub artifact_sizes: BTreeMap<String, u64>,
    pub processing_time_seconds: Option<f64>,
    pub resource: Option<TempResource>,
}

impl JobRecord {
    pub fn new(id: String, filename: String) -> Self {
        Self {
            id,
            filename,
            status: JobStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            artifacts: BTreeMap::new(),
            artifact_sizes: BTreeMap::new(),
            processing_time_seconds: None,
            resource: None,
        }
    }
}

/// Caller-facing view of a single job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job_id: String,
    pub filename: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
    /// Labels of separated stems. Empty until the job completes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stems: Vec<String>,
}

impl JobView {
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            filename: record.filename.clone(),
            status: record.status,
            started_at: record.started_at,
            completed_at: record.completed_at,
            processing_time_seconds: record.processing_time_seconds,
            stems: record.artifacts.keys().cloned().collect(),
        }
    }
}

/// Compact row for job listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub filename: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
}

impl JobSummary {
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            status: record.status,
            filename: record.filename.clone(),
            started_at: record.started_at,
            completed_at: record.completed_at,
            processing_time_seconds: record.processing_time_seconds,
        }
    }
}

/// Snapshot of both job collections.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListing {
    pub active_jobs: usize,
    pub completed_jobs: usize,
    pub active: Vec<JobSummary>,
    pub recent_completed: Vec<JobSummary>,
}
