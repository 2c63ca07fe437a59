//! Local storage health check across one or more directories

use std::path::PathBuf;
use std::sync::Arc;

use shufflehub_core::models::HealthSignal;

use super::evaluator::{transition, HealthState, Thresholds};
use crate::storage::UsageSampler;

#[derive(Debug)]
struct StorageDir {
    path: PathBuf,
    state: HealthState,
}

/// Per-directory hysteresis folded into one server-level verdict
///
/// The server is healthy while at least `min_healthy_percentage` of its
/// directories are. Directories that fail to sample keep their last state.
pub struct LocalStorageChecker {
    dirs: Vec<StorageDir>,
    thresholds: Thresholds,
    min_healthy_percentage: f64,
    sampler: Arc<dyn UsageSampler>,
    last: HealthSignal,
}

impl LocalStorageChecker {
    pub fn new(
        paths: impl IntoIterator<Item = PathBuf>,
        thresholds: Thresholds,
        min_healthy_percentage: f64,
        sampler: Arc<dyn UsageSampler>,
    ) -> Self {
        let dirs = paths
            .into_iter()
            .map(|path| StorageDir {
                path,
                state: HealthState::Healthy,
            })
            .collect();

        Self {
            dirs,
            thresholds,
            min_healthy_percentage,
            sampler,
            last: HealthSignal::default(),
        }
    }

    /// Verdict of the most recent check
    #[must_use]
    pub const fn last(&self) -> HealthSignal {
        self.last
    }

    /// Sample every directory and recompute the verdict
    pub fn check(&mut self) -> HealthSignal {
        let mut used_total = 0u64;
        let mut capacity_total = 0u64;
        let mut sampled = 0usize;

        for dir in &mut self.dirs {
            match self.sampler.sample(&dir.path) {
                Ok(usage) => {
                    let next = transition(dir.state, usage.percent(), &self.thresholds);
                    if next != dir.state {
                        tracing::info!(
                            path = %dir.path.display(),
                            usage_percent = usage.percent(),
                            healthy = next.is_healthy(),
                            "Storage directory health changed"
                        );
                    }
                    dir.state = next;
                    used_total = used_total.saturating_add(usage.used_bytes);
                    capacity_total = capacity_total.saturating_add(usage.total_bytes);
                    sampled += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %dir.path.display(),
                        error = %e,
                        "Failed to sample storage usage, keeping previous state"
                    );
                }
            }
        }

        if sampled == 0 {
            return self.last;
        }

        let usage_ratio = if capacity_total == 0 {
            0.0
        } else {
            used_total as f64 / capacity_total as f64
        };

        let healthy_dirs = self.dirs.iter().filter(|d| d.state.is_healthy()).count();
        let healthy =
            healthy_dirs as f64 * 100.0 >= self.min_healthy_percentage * self.dirs.len() as f64;

        if healthy != self.last.healthy {
            tracing::info!(
                healthy,
                healthy_dirs,
                total_dirs = self.dirs.len(),
                usage_ratio,
                "Shuffle server storage health changed"
            );
        }

        self.last = HealthSignal {
            healthy,
            usage_ratio,
        };
        self.last
    }
}
