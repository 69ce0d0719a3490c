//! Background reclamation of expired jobs and orphaned temp storage.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use walkdir::WalkDir;

use crate::registry::JobRegistry;
use crate::storage::ResourceAllocator;

/// TTL used by the manual cleanup trigger, shorter than the periodic sweep.
pub const MANUAL_SWEEP_TTL: Duration = Duration::from_secs(3600);

/// Outcome of one sweep (both passes).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub expired_jobs: usize,
    pub orphaned_files: usize,
    pub remaining_jobs: usize,
}

/// Periodically expires completed jobs past their TTL and scans the storage
/// root for leftovers the registry no longer knows about. The filesystem
/// pass is an independent safety net for crashes and missed releases.
pub struct ReclamationSweeper {
    registry: Arc<JobRegistry>,
    allocator: Arc<ResourceAllocator>,
    interval: Duration,
    ttl: Duration,
    quota_bytes: u64,
}

impl ReclamationSweeper {
    pub fn new(
        registry: Arc<JobRegistry>,
        allocator: Arc<ResourceAllocator>,
        interval: Duration,
        ttl: Duration,
        quota_bytes: u64,
    ) -> Self {
        Self {
            registry,
            allocator,
            interval,
            ttl,
            quota_bytes,
        }
    }

    /// Starts the background loop. It runs for the process lifetime and owns
    /// its own sleep cycle; each pass runs on a blocking worker thread.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // Skip the immediate first tick; nothing can have expired yet.
            ticker.tick().await;

            log::info!(
                "Reclamation sweeper started (interval {:?}, ttl {:?})",
                self.interval,
                self.ttl
            );

            loop {
                ticker.tick().await;
                let sweeper = Arc::clone(&self);
                let result =
                    tokio::task::spawn_blocking(move || sweeper.run_once(sweeper.ttl)).await;
                match result {
                    Ok(report) if report.expired_jobs > 0 || report.orphaned_files > 0 => {
                        log::info!(
                            "Sweep reclaimed {} expired jobs and {} orphaned files ({} jobs remain)",
                            report.expired_jobs,
                            report.orphaned_files,
                            report.remaining_jobs
                        );
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Sweep task failed: {}", e),
                }
            }
        })
    }

    /// Runs both passes synchronously with the given TTL. Per-item errors
    /// are logged and never abort the pass.
    pub fn run_once(&self, ttl: Duration) -> SweepReport {
        let expired_jobs = self.expire_completed_jobs(ttl);
        let orphaned_files = self.scan_orphans(ttl);

        let usage = self.allocator.usage_bytes();
        if usage > self.quota_bytes {
            log::warn!(
                "Temp storage usage ({} bytes) exceeds the configured ceiling ({} bytes)",
                usage,
                self.quota_bytes
            );
        }

        SweepReport {
            expired_jobs,
            orphaned_files,
            remaining_jobs: self.registry.completed_count(),
        }
    }

    /// Pass 1: registry-driven expiry of terminal jobs.
    fn expire_completed_jobs(&self, ttl: Duration) -> usize {
        let mut expired = 0;
        for job_id in self.registry.expired(ttl) {
            if let Some(mut record) = self.registry.remove(&job_id) {
                if let Some(resource) = record.resource.as_mut() {
                    self.allocator.release(resource);
                }
                log::info!("Expired job {}", job_id);
                expired += 1;
            }
        }
        expired
    }

    /// Pass 2: filesystem-driven orphan scan. Deletes any file under the
    /// base root older than the cutoff regardless of registry references,
    /// then removes directories that are empty and past the cutoff,
    /// children before parents.
    fn scan_orphans(&self, max_age: Duration) -> usize {
        let cutoff = match SystemTime::now().checked_sub(max_age) {
            Some(cutoff) => cutoff,
            None => return 0,
        };

        let base_root = self.allocator.base_root().to_path_buf();

        // Snapshot ages before deleting anything: removing a file bumps its
        // parent directory's mtime, which would otherwise shield old
        // directories from removal within the same pass.
        let candidates: Vec<(std::path::PathBuf, bool)> = WalkDir::new(&base_root)
            .contents_first(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.path() != base_root)
            .filter(|entry| {
                entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .map(|mtime| mtime < cutoff)
                    .unwrap_or(false)
            })
            .map(|entry| (entry.path().to_path_buf(), entry.file_type().is_file()))
            .collect();

        let mut removed = 0;
        for (path, is_file) in &candidates {
            if *is_file {
                match std::fs::remove_file(path) {
                    Ok(()) => removed += 1,
                    Err(e) => log::warn!("Failed to remove orphan {}: {}", path.display(), e),
                }
            } else if is_empty_dir(path) {
                if let Err(e) = std::fs::remove_dir(path) {
                    log::warn!("Failed to remove empty directory {}: {}", path.display(), e);
                }
            }
        }

        removed
    }
}

fn is_empty_dir(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => false,
    }
}
