//! Access pattern tracking for predictive warming
//!
//! Per-path records live in a sharded concurrent map so unrelated paths
//! never contend on the same lock. Memory stays bounded by construction: a
//! fixed-capacity timestamp ring and a hard cap on tracked co-access
//! partners, least-frequent partner evicted. Records are never explicitly
//! deleted.

use crate::keys::path_key;
use chrono::{DateTime, Local, Timelike};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Recent access timestamps kept per path
const RING_CAPACITY: usize = 32;
/// Distinct co-access partners tracked per path
const MAX_CO_ACCESS_PARTNERS: usize = 64;
/// Accesses needed before a prediction is attempted
const MIN_SAMPLES: usize = 3;
/// Most recent inter-access intervals averaged for prediction
const PREDICTION_WINDOW: usize = 5;

/// Bounded access history for one path
#[derive(Debug, Default, Clone)]
struct AccessPattern {
    /// Fixed-capacity ring of recent access times, oldest dropped
    recent: VecDeque<SystemTime>,
    /// Co-accessed path -> count, capped at MAX_CO_ACCESS_PARTNERS
    co_access: HashMap<String, u32>,
    /// Accesses per hour of day
    hour_histogram: [u32; 24],
}

impl AccessPattern {
    fn record(&mut self, at: SystemTime, co_accessed: &[String]) {
        if self.recent.len() == RING_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(at);

        let hour = DateTime::<Local>::from(at).hour() as usize;
        self.hour_histogram[hour] += 1;

        for other in co_accessed {
            if let Some(count) = self.co_access.get_mut(other) {
                *count += 1;
                continue;
            }
            if self.co_access.len() >= MAX_CO_ACCESS_PARTNERS {
                // Evict the least-frequent partner to make room
                if let Some(victim) = self
                    .co_access
                    .iter()
                    .min_by_key(|(path, count)| (**count, (*path).clone()))
                    .map(|(path, _)| path.clone())
                {
                    self.co_access.remove(&victim);
                }
            }
            self.co_access.insert(other.clone(), 1);
        }
    }

    fn predict_next(&self) -> Option<SystemTime> {
        if self.recent.len() < MIN_SAMPLES {
            return None;
        }

        let timestamps: Vec<SystemTime> = self
            .recent
            .iter()
            .rev()
            .take(PREDICTION_WINDOW + 1)
            .rev()
            .copied()
            .collect();

        let mut total = Duration::ZERO;
        let mut intervals = 0u32;
        for pair in timestamps.windows(2) {
            if let Ok(delta) = pair[1].duration_since(pair[0]) {
                total += delta;
                intervals += 1;
            }
        }
        if intervals == 0 {
            return None;
        }

        let mean = total / intervals;
        self.recent.back().map(|last| *last + mean)
    }
}

/// Shared, internally synchronized access history across all paths
pub struct AccessPatternTracker {
    patterns: DashMap<String, AccessPattern>,
}

impl AccessPatternTracker {
    pub fn new() -> Self {
        Self {
            patterns: DashMap::new(),
        }
    }

    /// Record an access, with the other paths touched in the same session
    /// window
    pub fn record_access(&self, path: &Path, co_accessed: &[&Path]) {
        self.record_access_at(path, co_accessed, SystemTime::now());
    }

    /// Time-injected variant; the seam the prediction tests drive
    pub fn record_access_at(&self, path: &Path, co_accessed: &[&Path], at: SystemTime) {
        let key = path_key(path);
        let partners: Vec<String> = co_accessed
            .iter()
            .map(|p| path_key(p))
            .filter(|p| *p != key)
            .collect();

        self.patterns.entry(key).or_default().record(at, &partners);
    }

    /// Predicted next access time: last access plus the mean of the most
    /// recent inter-access intervals. None until enough history exists.
    pub fn predict_next_access(&self, path: &Path) -> Option<SystemTime> {
        self.patterns
            .get(&path_key(path))
            .and_then(|pattern| pattern.predict_next())
    }

    /// The `n` most frequently co-accessed paths, highest count first.
    ///
    /// Seeds dependency-unaware warming: files habitually opened together
    /// even without an import edge between them.
    pub fn top_correlated(&self, path: &Path, n: usize) -> Vec<String> {
        let Some(pattern) = self.patterns.get(&path_key(path)) else {
            return Vec::new();
        };

        let mut partners: Vec<(String, u32)> = pattern
            .co_access
            .iter()
            .map(|(p, c)| (p.clone(), *c))
            .collect();
        // Count descending, then name, for a deterministic order
        partners.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        partners.into_iter().take(n).map(|(p, _)| p).collect()
    }

    /// Hour-of-day histogram for a path, if it has been seen
    pub fn hour_histogram(&self, path: &Path) -> Option<[u32; 24]> {
        self.patterns
            .get(&path_key(path))
            .map(|pattern| pattern.hour_histogram)
    }

    /// Number of distinct paths with recorded history
    pub fn tracked_paths(&self) -> usize {
        self.patterns.len()
    }
}

impl Default for AccessPatternTracker {
    fn default() -> Self {
        Self::new()
    }
}
