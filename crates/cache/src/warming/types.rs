//! Types and configuration for cache warming

use crate::errors::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Startup-time warming configuration supplied by the scheduler collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmingStrategy {
    /// Roots to warm first (entry points, recently edited files)
    pub priority_paths: Vec<PathBuf>,
    /// How many dependency hops to follow from each root
    pub dependency_depth: usize,
    /// Concurrent warm operations
    pub parallelism: usize,
    /// Usage ratio at or above which no new warm operations are issued
    pub memory_pressure_threshold: f64,
    /// Extra co-accessed paths to seed per root (0 disables correlation
    /// seeding)
    pub correlation_seeds: usize,
}

impl Default for WarmingStrategy {
    fn default() -> Self {
        Self {
            priority_paths: Vec::new(),
            dependency_depth: 2,
            parallelism: 4,
            memory_pressure_threshold: 0.9,
            correlation_seeds: 2,
        }
    }
}

impl WarmingStrategy {
    pub fn validate(&self) -> Result<()> {
        if !(0.0 < self.memory_pressure_threshold && self.memory_pressure_threshold < 1.0) {
            return Err(CacheError::configuration(format!(
                "memory_pressure_threshold must be in (0, 1), got {}",
                self.memory_pressure_threshold
            )));
        }
        if self.parallelism == 0 {
            return Err(CacheError::configuration("parallelism must be at least 1"));
        }
        Ok(())
    }
}

/// Result of one warming batch.
///
/// Per-file failures are collected here, never raised: one bad file cannot
/// block warming of the rest.
#[derive(Debug, Default)]
pub struct WarmingSummary {
    /// Files warmed into the content and artifact caches
    pub warmed: usize,
    /// Files not attempted because memory pressure crossed the threshold
    pub skipped_due_to_pressure: usize,
    /// (path, reason) for each file that failed to warm
    pub failed: Vec<(PathBuf, String)>,
    /// Wall-clock duration of the batch
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_strategy_is_valid() {
        WarmingStrategy::default().validate().unwrap();
    }

    #[test]
    fn test_threshold_bounds() {
        let strategy = WarmingStrategy {
            memory_pressure_threshold: 1.0,
            ..Default::default()
        };
        assert!(strategy.validate().is_err());

        let strategy = WarmingStrategy {
            memory_pressure_threshold: 0.0,
            ..Default::default()
        };
        assert!(strategy.validate().is_err());
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let strategy = WarmingStrategy {
            parallelism: 0,
            ..Default::default()
        };
        assert!(strategy.validate().is_err());
    }
}
