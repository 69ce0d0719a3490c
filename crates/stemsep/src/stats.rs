//! Point-in-time system resource snapshots for health reporting.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sysinfo::{Disks, System};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub memory_used_percent: f64,
    pub memory_available_bytes: u64,
    pub disk_used_percent: f64,
    pub disk_free_bytes: u64,
    pub cpu_percent: f64,
}

/// Reads memory, CPU, and disk figures. Disk numbers are taken from the
/// mount holding the temp storage root. Stateless; `snapshot` blocks for a
/// short CPU sampling window, so call it off the request path.
#[derive(Debug, Clone)]
pub struct StatsCollector {
    base_root: PathBuf,
}

impl StatsCollector {
    pub fn new<P: AsRef<Path>>(base_root: P) -> Self {
        Self {
            base_root: base_root.as_ref().to_path_buf(),
        }
    }

    pub fn snapshot(&self) -> SystemStats {
        let mut sys = System::new();
        sys.refresh_memory();

        // CPU usage needs two samples a minimum interval apart.
        sys.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();

        let total_memory = sys.total_memory();
        let available_memory = sys.available_memory();
        let memory_used_percent = if total_memory > 0 {
            (total_memory - available_memory) as f64 / total_memory as f64 * 100.0
        } else {
            0.0
        };

        let (disk_used_percent, disk_free_bytes) = self.disk_figures();

        SystemStats {
            memory_used_percent,
            memory_available_bytes: available_memory,
            disk_used_percent,
            disk_free_bytes,
            cpu_percent: sys.global_cpu_usage() as f64,
        }
    }

    /// Figures from the disk whose mount point is the longest prefix of the
    /// base root, falling back to zeros when no disk matches.
    fn disk_figures(&self) -> (f64, u64) {
        let target = self
            .base_root
            .canonicalize()
            .unwrap_or_else(|_| self.base_root.clone());

        let disks = Disks::new_with_refreshed_list();
        let best = disks
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len());

        match best {
            Some(disk) => {
                let total = disk.total_space();
                let free = disk.available_space();
                let used_percent = if total > 0 {
                    (total - free) as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                (used_percent, free)
            }
            None => {
                log::warn!("No disk found for {}", target.display());
                (0.0, 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_reports_sane_figures() {
        let temp = TempDir::new().unwrap();
        let collector = StatsCollector::new(temp.path());

        let stats = collector.snapshot();

        assert!(stats.memory_used_percent >= 0.0 && stats.memory_used_percent <= 100.0);
        assert!(stats.disk_used_percent >= 0.0 && stats.disk_used_percent <= 100.0);
        assert!(stats.cpu_percent >= 0.0);
        assert!(stats.memory_available_bytes > 0);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let temp = TempDir::new().unwrap();
        let stats = StatsCollector::new(temp.path()).snapshot();

        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("memoryUsedPercent").is_some());
        assert!(json.get("diskFreeBytes").is_some());
        assert!(json.get("cpuPercent").is_some());
    }
}
