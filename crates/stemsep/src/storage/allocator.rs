use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::StorageError;

/// Per-job ephemeral directory. Owned by the job record; the back-reference
/// to the job is informational only.
#[derive(Debug)]
pub struct TempResource {
    path: PathBuf,
    owner_job_id: String,
    created_at: DateTime<Utc>,
    released: bool,
}

impl TempResource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner_job_id(&self) -> &str {
        &self.owner_job_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

/// Creates and destroys per-job working directories under a base storage
/// root. Directory names are fresh UUIDs, so a path is never reused while an
/// earlier resource for it could still be live.
pub struct ResourceAllocator {
    base_root: PathBuf,
}

impl ResourceAllocator {
    /// Creates the allocator, creating the base root if it does not exist.
    pub fn new<P: AsRef<Path>>(base_root: P) -> Result<Self, StorageError> {
        let base_root = base_root.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_root).map_err(|e| StorageError::CreateDirectory {
            path: base_root.clone(),
            source: e,
        })?;
        Ok(Self { base_root })
    }

    pub fn base_root(&self) -> &Path {
        &self.base_root
    }

    pub fn allocate(&self, owner_job_id: &str) -> Result<TempResource, StorageError> {
        let path = self.base_root.join(uuid::Uuid::new_v4().to_string());
        std::fs::create_dir(&path).map_err(|e| StorageError::CreateDirectory {
            path: path.clone(),
            source: e,
        })?;

        log::info!("Allocated temp directory {} for job {}", path.display(), owner_job_id);

        Ok(TempResource {
            path,
            owner_job_id: owner_job_id.to_string(),
            created_at: Utc::now(),
            released: false,
        })
    }

    /// Recursively deletes the resource's directory tree. Safe to call more
    /// than once: a directory that is already gone is a logged no-op, because
    /// release can race with the filesystem orphan sweep.
    pub fn release(&self, resource: &mut TempResource) {
        if resource.released {
            return;
        }

        match std::fs::remove_dir_all(&resource.path) {
            Ok(()) => {
                log::info!(
                    "Released temp directory {} for job {}",
                    resource.path.display(),
                    resource.owner_job_id
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(
                    "Temp directory {} already removed",
                    resource.path.display()
                );
            }
            Err(e) => {
                log::warn!(
                    "Failed to remove temp directory {}: {}",
                    resource.path.display(),
                    e
                );
            }
        }

        resource.released = true;
    }

    /// Sums file sizes under the base root. Used for disk-pressure
    /// reporting; walk errors are skipped.
    pub fn usage_bytes(&self) -> u64 {
        WalkDir::new(&self.base_root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }

    /// Number of top-level job directories currently present.
    pub fn dir_count(&self) -> usize {
        match std::fs::read_dir(&self.base_root) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .count(),
            Err(e) => {
                log::warn!(
                    "Failed to read base root {}: {}",
                    self.base_root.display(),
                    e
                );
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_creates_base_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("audio_processing");
        assert!(!root.exists());

        let allocator = ResourceAllocator::new(&root).unwrap();
        assert!(root.exists());
        assert_eq!(allocator.base_root(), root);
    }

    #[test]
    fn test_allocate_creates_unique_directories() {
        let temp = TempDir::new().unwrap();
        let allocator = ResourceAllocator::new(temp.path()).unwrap();

        let first = allocator.allocate("job-1").unwrap();
        let second = allocator.allocate("job-2").unwrap();

        assert!(first.path().is_dir());
        assert!(second.path().is_dir());
        assert_ne!(first.path(), second.path());
        assert_eq!(first.owner_job_id(), "job-1");
        assert_eq!(allocator.dir_count(), 2);
    }

    #[test]
    fn test_release_removes_tree() {
        let temp = TempDir::new().unwrap();
        let allocator = ResourceAllocator::new(temp.path()).unwrap();

        let mut resource = allocator.allocate("job-1").unwrap();
        std::fs::create_dir(resource.path().join("output")).unwrap();
        std::fs::write(resource.path().join("output/vocals.wav"), b"data").unwrap();

        allocator.release(&mut resource);
        assert!(!resource.path().exists());
        assert!(resource.is_released());
    }

    #[test]
    fn test_release_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let allocator = ResourceAllocator::new(temp.path()).unwrap();

        let mut resource = allocator.allocate("job-1").unwrap();
        allocator.release(&mut resource);
        // Second call must be a no-op, not an error.
        allocator.release(&mut resource);
        assert!(resource.is_released());
    }

    #[test]
    fn test_release_tolerates_missing_directory() {
        let temp = TempDir::new().unwrap();
        let allocator = ResourceAllocator::new(temp.path()).unwrap();

        let mut resource = allocator.allocate("job-1").unwrap();
        // Simulate an orphan sweep deleting the directory first.
        std::fs::remove_dir_all(resource.path()).unwrap();

        allocator.release(&mut resource);
        assert!(resource.is_released());
    }

    #[test]
    fn test_usage_bytes_sums_files() {
        let temp = TempDir::new().unwrap();
        let allocator = ResourceAllocator::new(temp.path()).unwrap();

        let resource = allocator.allocate("job-1").unwrap();
        std::fs::write(resource.path().join("input.wav"), vec![0u8; 1024]).unwrap();
        std::fs::write(resource.path().join("extra.wav"), vec![0u8; 512]).unwrap();

        assert_eq!(allocator.usage_bytes(), 1536);
    }
}
