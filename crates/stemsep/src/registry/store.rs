//! In-memory job registry: the single source of truth for job state.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;

use crate::error::RegistryError;
use crate::registry::job::{JobListing, JobRecord, JobStatus, JobSummary, JobView};
use crate::storage::TempResource;

/// How many completed jobs a listing reports.
const RECENT_COMPLETED_LIMIT: usize = 10;

struct RegistryInner {
    active: HashMap<String, JobRecord>,
    completed: HashMap<String, JobRecord>,
    /// Completion order, oldest first. Drives the recent-completed tail.
    completed_order: VecDeque<String>,
}

/// Tracks active and terminal jobs behind a single mutex. A job id resolves
/// to at most one of the two maps at any time. Registry state is volatile:
/// it lives only for the process lifetime.
pub struct JobRegistry {
    inner: Mutex<RegistryInner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                active: HashMap::new(),
                completed: HashMap::new(),
                completed_order: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Allocates a fresh unique id and inserts a `Pending` record.
    pub fn create(&self, filename: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let record = JobRecord::new(id.clone(), filename.to_string());

        let mut inner = self.lock();
        inner.active.insert(id.clone(), record);
        id
    }

    /// Stores the job's temp resource on its record so the sweeper can find
    /// and release it later.
    pub fn attach_resource(
        &self,
        job_id: &str,
        resource: TempResource,
    ) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        let record = inner
            .active
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))?;
        record.resource = Some(resource);
        Ok(())
    }

    pub fn mark_processing(&self, job_id: &str) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        let record = inner
            .active
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))?;
        record.status = JobStatus::Processing;
        Ok(())
    }

    /// Moves the job from the active set to the completed set with its
    /// artifact mapping.
    pub fn mark_completed(
        &self,
        job_id: &str,
        artifacts: BTreeMap<String, PathBuf>,
        artifact_sizes: BTreeMap<String, u64>,
        processing_time_seconds: f64,
    ) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        let mut record = inner
            .active
            .remove(job_id)
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))?;

        record.status = JobStatus::Completed;
        record.completed_at = Some(Utc::now());
        record.artifacts = artifacts;
        record.artifact_sizes = artifact_sizes;
        record.processing_time_seconds = Some(processing_time_seconds);

        inner.completed_order.push_back(job_id.to_string());
        inner.completed.insert(job_id.to_string(), record);
        Ok(())
    }

    /// Drops a failed job from the active set, handing back its temp
    /// resource for release. No terminal record is kept: the failure is
    /// reported to the submitting caller and the id becomes unknown.
    pub fn mark_failed(&self, job_id: &str) -> Option<TempResource> {
        let mut inner = self.lock();
        let mut record = inner.active.remove(job_id)?;
        record.resource.take()
    }

    pub fn get(&self, job_id: &str) -> Result<JobView, RegistryError> {
        let inner = self.lock();
        inner
            .active
            .get(job_id)
            .or_else(|| inner.completed.get(job_id))
            .map(JobView::from_record)
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))
    }

    /// Resolves a stem label to its artifact path for a completed job.
    pub fn artifact_path(&self, job_id: &str, stem: &str) -> Result<PathBuf, RegistryError> {
        let inner = self.lock();
        let record = inner
            .completed
            .get(job_id)
            .or_else(|| inner.active.get(job_id))
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))?;
        record
            .artifacts
            .get(stem)
            .cloned()
            .ok_or_else(|| RegistryError::StemNotFound {
                job_id: job_id.to_string(),
                stem: stem.to_string(),
            })
    }

    /// Removes a job record entirely. Removing an absent id is a no-op.
    pub fn remove(&self, job_id: &str) -> Option<JobRecord> {
        let mut inner = self.lock();
        let record = inner
            .completed
            .remove(job_id)
            .or_else(|| inner.active.remove(job_id));
        if record.is_some() {
            inner.completed_order.retain(|id| id != job_id);
        }
        record
    }

    /// Ids of terminal jobs whose completion age exceeds `ttl`.
    pub fn expired(&self, ttl: Duration) -> Vec<String> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());

        let inner = self.lock();
        inner
            .completed
            .values()
            .filter(|record| {
                record
                    .completed_at
                    .map(|at| at < cutoff)
                    .unwrap_or(false)
            })
            .map(|record| record.id.clone())
            .collect()
    }

    pub fn list(&self) -> JobListing {
        let inner = self.lock();

        let active: Vec<JobSummary> = inner.active.values().map(JobSummary::from_record).collect();

        let mut recent_completed: Vec<JobSummary> = inner
            .completed_order
            .iter()
            .rev()
            .take(RECENT_COMPLETED_LIMIT)
            .filter_map(|id| inner.completed.get(id))
            .map(JobSummary::from_record)
            .collect();
        // Present oldest-first, matching completion order.
        recent_completed.reverse();

        JobListing {
            active_jobs: inner.active.len(),
            completed_jobs: inner.completed.len(),
            active,
            recent_completed,
        }
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    pub fn completed_count(&self) -> usize {
        self.lock().completed.len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ResourceAllocator;
    use tempfile::TempDir;

    fn completed_artifacts() -> (BTreeMap<String, PathBuf>, BTreeMap<String, u64>) {
        let mut artifacts = BTreeMap::new();
        artifacts.insert("vocals".to_string(), PathBuf::from("/tmp/x/vocals.wav"));
        artifacts.insert(
            "accompaniment".to_string(),
            PathBuf::from("/tmp/x/accompaniment.wav"),
        );
        let mut sizes = BTreeMap::new();
        sizes.insert("vocals".to_string(), 1000);
        sizes.insert("accompaniment".to_string(), 2000);
        (artifacts, sizes)
    }

    #[test]
    fn test_create_and_get() {
        let registry = JobRegistry::new();
        let id = registry.create("song.mp3");

        let view = registry.get(&id).unwrap();
        assert_eq!(view.job_id, id);
        assert_eq!(view.filename, "song.mp3");
        assert_eq!(view.status, JobStatus::Pending);
        assert!(view.stems.is_empty());
    }

    #[test]
    fn test_get_unknown_job() {
        let registry = JobRegistry::new();
        assert!(matches!(
            registry.get("missing"),
            Err(RegistryError::JobNotFound(_))
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = JobRegistry::new();
        let first = registry.create("a.wav");
        let second = registry.create("a.wav");
        assert_ne!(first, second);
    }

    #[test]
    fn test_completion_moves_between_sets() {
        let registry = JobRegistry::new();
        let id = registry.create("song.mp3");

        registry.mark_processing(&id).unwrap();
        assert_eq!(registry.get(&id).unwrap().status, JobStatus::Processing);
        assert_eq!(registry.active_count(), 1);

        let (artifacts, sizes) = completed_artifacts();
        registry.mark_completed(&id, artifacts, sizes, 12.5).unwrap();

        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.completed_count(), 1);

        let view = registry.get(&id).unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.processing_time_seconds, Some(12.5));
        assert_eq!(view.stems, vec!["accompaniment", "vocals"]);
    }

    #[test]
    fn test_mark_failed_drops_record_and_returns_resource() {
        let temp = TempDir::new().unwrap();
        let allocator = ResourceAllocator::new(temp.path()).unwrap();

        let registry = JobRegistry::new();
        let id = registry.create("song.mp3");
        let resource = allocator.allocate(&id).unwrap();
        registry.attach_resource(&id, resource).unwrap();
        registry.mark_processing(&id).unwrap();

        let returned = registry.mark_failed(&id);
        assert!(returned.is_some());

        assert!(matches!(
            registry.get(&id),
            Err(RegistryError::JobNotFound(_))
        ));
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.completed_count(), 0);
    }

    #[test]
    fn test_mark_failed_unknown_job_is_noop() {
        let registry = JobRegistry::new();
        assert!(registry.mark_failed("missing").is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = JobRegistry::new();
        let id = registry.create("song.mp3");

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn test_artifact_path_lookup() {
        let registry = JobRegistry::new();
        let id = registry.create("song.mp3");
        registry.mark_processing(&id).unwrap();
        let (artifacts, sizes) = completed_artifacts();
        registry.mark_completed(&id, artifacts, sizes, 1.0).unwrap();

        let path = registry.artifact_path(&id, "vocals").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x/vocals.wav"));

        assert!(matches!(
            registry.artifact_path(&id, "drums"),
            Err(RegistryError::StemNotFound { .. })
        ));
        assert!(matches!(
            registry.artifact_path("missing", "vocals"),
            Err(RegistryError::JobNotFound(_))
        ));
    }

    #[test]
    fn test_expired_with_zero_ttl() {
        let registry = JobRegistry::new();
        let id = registry.create("song.mp3");
        registry.mark_processing(&id).unwrap();
        let (artifacts, sizes) = completed_artifacts();
        registry.mark_completed(&id, artifacts, sizes, 1.0).unwrap();

        // A completed job is strictly older than "now" once marked.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let expired = registry.expired(Duration::ZERO);
        assert_eq!(expired, vec![id]);
    }

    #[test]
    fn test_expired_respects_ttl() {
        let registry = JobRegistry::new();
        let id = registry.create("song.mp3");
        registry.mark_processing(&id).unwrap();
        let (artifacts, sizes) = completed_artifacts();
        registry.mark_completed(&id, artifacts, sizes, 1.0).unwrap();

        assert!(registry.expired(Duration::from_secs(3600)).is_empty());
    }

    #[test]
    fn test_recent_completed_is_bounded() {
        let registry = JobRegistry::new();
        for i in 0..12 {
            let id = registry.create(&format!("song{}.mp3", i));
            registry.mark_processing(&id).unwrap();
            let (artifacts, sizes) = completed_artifacts();
            registry.mark_completed(&id, artifacts, sizes, 1.0).unwrap();
        }

        let listing = registry.list();
        assert_eq!(listing.completed_jobs, 12);
        assert_eq!(listing.recent_completed.len(), 10);
        assert_eq!(listing.active_jobs, 0);
    }

    #[test]
    fn test_listing_serializes_camel_case() {
        let registry = JobRegistry::new();
        registry.create("song.mp3");

        let listing = registry.list();
        let json = serde_json::to_value(&listing).unwrap();
        assert!(json.get("activeJobs").is_some());
        assert!(json.get("recentCompleted").is_some());
    }
}
