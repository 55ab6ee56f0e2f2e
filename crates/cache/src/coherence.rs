//! Cross-level invalidation with a declared dependency table
//!
//! The only sanctioned way one level's change removes another level's
//! entries. The table is configuration-loaded and read-only at runtime;
//! traversal is explicit and cycle-guarded so a misconfigured table can slow
//! a cascade down but never hang it.

use crate::errors::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// The cache levels the coherence table can name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheLevel {
    FileContent,
    Artifact,
    Incremental,
    Stream,
}

impl CacheLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileContent => "file-content",
            Self::Artifact => "artifact",
            Self::Incremental => "incremental",
            Self::Stream => "stream",
        }
    }
}

impl std::fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the dependency table: invalidating `origin` cascades to
/// `dependents`, in declared order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeRule {
    pub origin: CacheLevel,
    pub dependents: Vec<CacheLevel>,
}

/// A cache level that can drop everything stored under a logical (path) key.
///
/// Implementations translate the path key into their own key space; the
/// manager never reaches into a store directly.
pub trait CoherentLevel: Send + Sync {
    /// Remove all entries for the key; returns how many were removed
    fn invalidate_level_key(&self, key: &str) -> usize;
}

/// Cascading invalidation across registered levels
pub struct CoherenceManager {
    /// Declared order preserved; drives deterministic cascade order
    table: Vec<CascadeRule>,
    levels: HashMap<CacheLevel, Arc<dyn CoherentLevel>>,
}

impl CoherenceManager {
    /// Build from a dependency table, rejecting duplicate origin rows
    pub fn new(table: Vec<CascadeRule>) -> Result<Self> {
        let mut seen = HashSet::new();
        for rule in &table {
            if !seen.insert(rule.origin) {
                return Err(CacheError::configuration(format!(
                    "duplicate cascade rule for level '{}'",
                    rule.origin
                )));
            }
        }
        Ok(Self {
            table,
            levels: HashMap::new(),
        })
    }

    /// Attach the store behind a level name
    pub fn register_level(&mut self, level: CacheLevel, store: Arc<dyn CoherentLevel>) {
        self.levels.insert(level, store);
    }

    /// Invalidate `key` in the origin level and, guided by the table, in
    /// every declared dependent level.
    ///
    /// Completes fully before returning: callers never observe an origin
    /// entry gone while a dependent entry referencing stale data remains. A
    /// visited set of (level, key) pairs guarantees termination even for a
    /// cyclic table. Returns the total number of entries removed.
    pub fn invalidate_cascade(&self, origin: CacheLevel, key: &str) -> usize {
        let mut removed = 0;
        let mut visited: HashSet<(CacheLevel, String)> = HashSet::new();
        let mut worklist: VecDeque<CacheLevel> = VecDeque::new();
        worklist.push_back(origin);

        while let Some(level) = worklist.pop_front() {
            if !visited.insert((level, key.to_string())) {
                continue;
            }

            if let Some(store) = self.levels.get(&level) {
                removed += store.invalidate_level_key(key);
            }

            if let Some(rule) = self.table.iter().find(|r| r.origin == level) {
                for dependent in &rule.dependents {
                    worklist.push_back(*dependent);
                }
            }
        }

        if removed > 0 {
            tracing::debug!(origin = %origin, key, removed, "cascading invalidation");
        }
        removed
    }

    /// The declared dependents of a level, if any
    pub fn dependents_of(&self, level: CacheLevel) -> &[CacheLevel] {
        self.table
            .iter()
            .find(|r| r.origin == level)
            .map(|r| r.dependents.as_slice())
            .unwrap_or(&[])
    }
}
