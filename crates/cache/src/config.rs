//! Typed cache configuration with validated fields and documented defaults
//!
//! Replaces the ad-hoc nested-map tuning of earlier designs: every knob is a
//! named field, validated up front, with a default that works unconfigured.

use crate::coherence::{CacheLevel, CascadeRule};
use crate::errors::{CacheError, Result};
use crate::store::EvictionTuning;
use crate::stream::BackpressurePolicy;
use scour_utils::XdgPaths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the whole cache subsystem
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Memory limit for raw file content
    pub content_max_bytes: u64,
    /// Memory limit for parsed artifacts
    pub artifact_max_bytes: u64,
    /// Memory limit for live stream results
    pub stream_max_bytes: u64,
    /// Maximum unconsumed stream queue depth
    pub stream_max_depth: usize,
    /// Producer behavior at the depth limit
    pub stream_backpressure: BackpressurePolicy,
    /// Root directory for persisted artifacts; None disables the disk layer
    pub persist_root: Option<PathBuf>,
    /// zstd level for persisted artifacts (1-22)
    pub compression_level: i32,
    /// Snapshot file for the incremental cache; None disables cross-session
    /// persistence
    pub incremental_snapshot: Option<PathBuf>,
    /// Retention window for incremental entries
    pub incremental_retention: Duration,
    /// Depth bound for transitive invalidation
    pub invalidation_max_depth: usize,
    /// Eviction thresholds shared by all stores
    pub tuning: EvictionTuning,
    /// Inter-level invalidation table
    pub coherence_table: Vec<CascadeRule>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let cache_root = XdgPaths::cache_dir();
        Self {
            content_max_bytes: 64 * 1024 * 1024,   // 64MB
            artifact_max_bytes: 256 * 1024 * 1024, // 256MB
            stream_max_bytes: 16 * 1024 * 1024,    // 16MB
            stream_max_depth: 256,
            stream_backpressure: BackpressurePolicy::DropOldest,
            persist_root: Some(cache_root.join("artifacts")),
            compression_level: 3,
            incremental_snapshot: Some(cache_root.join("incremental.json")),
            incremental_retention: Duration::from_secs(7 * 24 * 3600), // 7 days
            invalidation_max_depth: 32,
            tuning: EvictionTuning::default(),
            coherence_table: default_coherence_table(),
        }
    }
}

impl CacheConfig {
    /// Validate field ranges; returns the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.content_max_bytes == 0 || self.artifact_max_bytes == 0 {
            return Err(CacheError::configuration(
                "store memory limits must be non-zero",
            ));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(CacheError::configuration(format!(
                "compression level {} outside 1-22",
                self.compression_level
            )));
        }
        if self.invalidation_max_depth == 0 {
            return Err(CacheError::configuration(
                "invalidation depth bound must be at least 1",
            ));
        }
        validate_tuning(&self.tuning)?;
        Ok(())
    }
}

/// File changes cascade everywhere; artifact changes leave raw content
/// alone; the leaf levels cascade nowhere.
pub fn default_coherence_table() -> Vec<CascadeRule> {
    vec![
        CascadeRule {
            origin: CacheLevel::FileContent,
            dependents: vec![
                CacheLevel::Artifact,
                CacheLevel::Incremental,
                CacheLevel::Stream,
            ],
        },
        CascadeRule {
            origin: CacheLevel::Artifact,
            dependents: vec![CacheLevel::Incremental, CacheLevel::Stream],
        },
        CascadeRule {
            origin: CacheLevel::Incremental,
            dependents: vec![],
        },
        CascadeRule {
            origin: CacheLevel::Stream,
            dependents: vec![],
        },
    ]
}

fn validate_tuning(tuning: &EvictionTuning) -> Result<()> {
    let ratios = [
        ("overflow_target_ratio", tuning.overflow_target_ratio),
        ("proactive_threshold", tuning.proactive_threshold),
        ("proactive_target_ratio", tuning.proactive_target_ratio),
        ("critical_threshold", tuning.critical_threshold),
        ("critical_target_ratio", tuning.critical_target_ratio),
    ];
    for (name, value) in ratios {
        if !(0.0 < value && value < 1.0) {
            return Err(CacheError::configuration(format!(
                "{name} must be in (0, 1), got {value}"
            )));
        }
    }
    if tuning.proactive_target_ratio >= tuning.proactive_threshold
        || tuning.critical_target_ratio >= tuning.critical_threshold
    {
        return Err(CacheError::configuration(
            "eviction targets must sit below their trigger thresholds",
        ));
    }
    Ok(())
}

/// Loadable form of the coherence table, for configuration files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceConfig {
    pub cascades: Vec<CascadeRule>,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            cascades: default_coherence_table(),
        }
    }
}
