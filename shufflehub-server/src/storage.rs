//! Storage capacity sampling

use std::path::Path;
use sysinfo::Disks;

use crate::error::{Error, Result};

/// Used and total bytes of the filesystem backing one storage directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl DiskUsage {
    #[must_use]
    pub const fn new(used_bytes: u64, total_bytes: u64) -> Self {
        Self {
            used_bytes,
            total_bytes,
        }
    }

    /// Used over total, 0.0 for an empty filesystem
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64
    }

    #[must_use]
    pub fn percent(&self) -> f64 {
        self.ratio() * 100.0
    }
}

/// Source of storage usage samples
///
/// Sampling may block on filesystem calls; callers run it off the async
/// executor.
pub trait UsageSampler: Send + Sync {
    fn sample(&self, path: &Path) -> Result<DiskUsage>;
}

/// Samples the mounted filesystem that contains each directory
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalDiskSampler;

impl UsageSampler for LocalDiskSampler {
    fn sample(&self, path: &Path) -> Result<DiskUsage> {
        let resolved = std::fs::canonicalize(path)?;
        let disks = Disks::new_with_refreshed_list();

        // Deepest mount point containing the directory wins
        let mut best: Option<(usize, u64, u64)> = None;
        for disk in disks.list() {
            let mount = disk.mount_point();
            if !resolved.starts_with(mount) {
                continue;
            }
            let depth = mount.components().count();
            match best {
                Some((best_depth, _, _)) if depth < best_depth => {}
                _ => best = Some((depth, disk.available_space(), disk.total_space())),
            }
        }

        let (_, available, total) = best.ok_or_else(|| {
            Error::Storage(format!("No mounted disk found for {}", resolved.display()))
        })?;
        if total == 0 {
            return Err(Error::Storage(format!(
                "Disk for {} reports zero capacity",
                resolved.display()
            )));
        }

        Ok(DiskUsage::new(total.saturating_sub(available), total))
    }
}
