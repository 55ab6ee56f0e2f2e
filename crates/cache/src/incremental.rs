//! Incremental analysis cache with dependency-aware invalidation
//!
//! Partial results are keyed by (scope path, analysis kind) and carry the
//! dependency edges active when they were computed. Edges are structural and
//! keyed by path, not content identity: they outlive content changes and are
//! fully replaced whenever a file's artifact is repopulated, so stale imports
//! never accumulate as ghost edges.

use crate::errors::{CacheError, RecoveryHint, Result, SerializationOp};
use crate::keys::path_key;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// A cached partial result plus the metadata needed for expiry and
/// invalidation
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IncrementalEntry<R> {
    scope: String,
    kind: String,
    result: R,
    size_bytes: u64,
    created_at: SystemTime,
}

/// Directed dependency edges, adjacency-keyed by path.
///
/// `forward` maps a dependent to what it imports; `reverse` is the derived
/// index used to answer "who depends on this changed file".
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct DependencyGraph {
    forward: HashMap<String, HashSet<String>>,
    reverse: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    /// Replace (never merge) the dependency set of `dependent`
    fn set_dependencies(&mut self, dependent: &str, dependencies: HashSet<String>) {
        if let Some(old) = self.forward.remove(dependent) {
            for dep in old {
                if let Some(dependents) = self.reverse.get_mut(&dep) {
                    dependents.remove(dependent);
                    if dependents.is_empty() {
                        self.reverse.remove(&dep);
                    }
                }
            }
        }

        for dep in &dependencies {
            self.reverse
                .entry(dep.clone())
                .or_default()
                .insert(dependent.to_string());
        }
        if !dependencies.is_empty() {
            self.forward.insert(dependent.to_string(), dependencies);
        }
    }

    /// All paths that transitively depend on `origin`, up to `max_depth`
    /// hops. Cycle-safe: a visited set means cycle members are collected once
    /// each.
    fn transitive_dependents(&self, origin: &str, max_depth: usize) -> HashSet<String> {
        let mut affected = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<(String, usize)> = VecDeque::new();

        visited.insert(origin.to_string());
        frontier.push_back((origin.to_string(), 0));

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            if let Some(dependents) = self.reverse.get(&current) {
                for dependent in dependents {
                    if visited.insert(dependent.clone()) {
                        affected.insert(dependent.clone());
                        frontier.push_back((dependent.clone(), depth + 1));
                    }
                }
            }
        }

        affected
    }
}

/// Serialized form of the cache for cross-session persistence
#[derive(Serialize, Deserialize)]
struct Snapshot<R> {
    entries: Vec<IncrementalEntry<R>>,
    graph: DependencyGraph,
}

struct Inner<R> {
    entries: HashMap<String, IncrementalEntry<R>>,
    graph: DependencyGraph,
}

/// Cache of partial re-analysis results
pub struct IncrementalCache<R> {
    inner: Mutex<Inner<R>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    current_bytes: AtomicU64,
}

impl<R> IncrementalCache<R>
where
    R: Clone + Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                graph: DependencyGraph::default(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            current_bytes: AtomicU64::new(0),
        }
    }

    /// Fetch a cached result or compute and store it.
    ///
    /// The cache lock is not held while the closure runs; two racing callers
    /// may both compute and the last store wins, which is safe because both
    /// results are keyed by the same (scope, kind).
    pub fn get_or_compute(
        &self,
        scope: &Path,
        kind: &str,
        compute: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let key = entry_key(&path_key(scope), kind);

        if let Some(entry) = self.inner.lock().entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.result.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let result = compute()?;
        self.store(scope, kind, result.clone())?;
        Ok(result)
    }

    /// Store a result directly
    pub fn store(&self, scope: &Path, kind: &str, result: R) -> Result<()> {
        let scope_key = path_key(scope);
        let size = bincode::serialized_size(&result).map_err(|e| CacheError::Serialization {
            key: entry_key(&scope_key, kind),
            operation: SerializationOp::Serialize,
            source: e,
            recovery_hint: RecoveryHint::Ignore,
        })?;

        let entry = IncrementalEntry {
            scope: scope_key.clone(),
            kind: kind.to_string(),
            result,
            size_bytes: size,
            created_at: SystemTime::now(),
        };

        let mut inner = self.inner.lock();
        if let Some(old) = inner.entries.insert(entry_key(&scope_key, kind), entry) {
            self.current_bytes.fetch_sub(old.size_bytes, Ordering::AcqRel);
        }
        self.current_bytes.fetch_add(size, Ordering::AcqRel);
        Ok(())
    }

    /// Replace the recorded dependency edges for a file.
    ///
    /// Called whenever the file's artifact is (re)populated and its static
    /// imports are known.
    pub fn record_dependencies(&self, dependent: &Path, dependencies: &[PathBuf]) {
        let deps: HashSet<String> = dependencies.iter().map(|p| path_key(p)).collect();
        self.inner
            .lock()
            .graph
            .set_dependencies(&path_key(dependent), deps);
    }

    /// The currently recorded dependencies of a path, if any were recorded.
    ///
    /// Sorted for a deterministic traversal order downstream.
    pub fn dependencies_of(&self, dependent: &Path) -> Option<Vec<PathBuf>> {
        let inner = self.inner.lock();
        let deps = inner.graph.forward.get(&path_key(dependent))?;
        let mut sorted: Vec<String> = deps.iter().cloned().collect();
        sorted.sort();
        Some(sorted.into_iter().map(PathBuf::from).collect())
    }

    /// Invalidate the results of a changed path and everything that
    /// transitively depends on it, bounded by `max_depth`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_transitive(&self, path: &Path, max_depth: usize) -> usize {
        let origin = path_key(path);
        let mut inner = self.inner.lock();

        let mut affected = inner.graph.transitive_dependents(&origin, max_depth);
        affected.insert(origin);

        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| affected.contains(&e.scope))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &doomed {
            if let Some(old) = inner.entries.remove(key) {
                self.current_bytes.fetch_sub(old.size_bytes, Ordering::AcqRel);
                self.invalidations.fetch_add(1, Ordering::Relaxed);
            }
        }

        if !doomed.is_empty() {
            tracing::debug!(origin = %path.display(), removed = doomed.len(), "transitive invalidation");
        }
        doomed.len()
    }

    /// Remove entries older than the retention window; returns how many were
    /// removed. Invoked by the external scheduler, never self-scheduled.
    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        let cutoff = SystemTime::now() - max_age;
        let mut inner = self.inner.lock();

        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.created_at < cutoff)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &doomed {
            if let Some(old) = inner.entries.remove(key) {
                self.current_bytes.fetch_sub(old.size_bytes, Ordering::AcqRel);
            }
        }
        doomed.len()
    }

    /// Write the entries and dependency graph to disk as JSON, atomically
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = {
            let inner = self.inner.lock();
            Snapshot {
                entries: inner.entries.values().cloned().collect(),
                graph: inner.graph.clone(),
            }
        };

        let json = serde_json::to_string(&snapshot).map_err(|e| CacheError::Serialization {
            key: "incremental-snapshot".to_string(),
            operation: SerializationOp::Serialize,
            source: Box::new(e),
            recovery_hint: RecoveryHint::Ignore,
        })?;

        scour_utils::write_atomic_string(path, &json).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            operation: "write incremental snapshot",
            source: e,
            recovery_hint: RecoveryHint::CheckPermissions {
                path: path.to_path_buf(),
            },
        })
    }

    /// Load a snapshot written by a previous session.
    ///
    /// A missing file is fine (fresh start). A corrupt file is deleted and
    /// treated the same way.
    pub fn load_snapshot(&self, path: &Path) -> Result<usize> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    operation: "read incremental snapshot",
                    source: e,
                    recovery_hint: RecoveryHint::Recreate,
                })
            }
        };

        let snapshot: Snapshot<R> = match serde_json::from_str(&json) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "deleting corrupt incremental snapshot");
                let _ = std::fs::remove_file(path);
                return Ok(0);
            }
        };

        let mut inner = self.inner.lock();
        let mut loaded = 0;
        let mut bytes = 0;
        for entry in snapshot.entries {
            bytes += entry.size_bytes;
            inner
                .entries
                .insert(entry_key(&entry.scope, &entry.kind), entry);
            loaded += 1;
        }
        inner.graph = snapshot.graph;
        self.current_bytes.fetch_add(bytes, Ordering::AcqRel);

        tracing::info!(loaded, "restored incremental cache snapshot");
        Ok(loaded)
    }

    pub fn snapshot_stats(&self) -> crate::entry::StoreStats {
        let entry_count = self.inner.lock().entries.len() as u64;
        crate::entry::StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.invalidations.load(Ordering::Relaxed),
            current_bytes: self.current_bytes.load(Ordering::Acquire),
            entry_count,
        }
    }
}

impl<R> Default for IncrementalCache<R>
where
    R: Clone + Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

fn entry_key(scope: &str, kind: &str) -> String {
    format!("{scope}::{kind}")
}

#[cfg(test)]
mod tests {
    use super::*;

    type Cache = IncrementalCache<Vec<String>>;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn test_get_or_compute_caches() {
        let cache = Cache::new();
        let mut calls = 0;

        let first = cache
            .get_or_compute(&p("a.py"), "complexity", || {
                calls += 1;
                Ok(vec!["r1".to_string()])
            })
            .unwrap();
        let second = cache
            .get_or_compute(&p("a.py"), "complexity", || {
                calls += 1;
                Ok(vec!["r2".to_string()])
            })
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_kinds_are_independent() {
        let cache = Cache::new();
        cache.store(&p("a.py"), "complexity", vec!["c".into()]).unwrap();
        cache.store(&p("a.py"), "imports", vec!["i".into()]).unwrap();
        assert_eq!(cache.snapshot_stats().entry_count, 2);
    }

    #[test]
    fn test_transitive_invalidation() {
        let cache = Cache::new();
        // c depends on b depends on a
        cache.record_dependencies(&p("b.py"), &[p("a.py")]);
        cache.record_dependencies(&p("c.py"), &[p("b.py")]);
        for f in ["a.py", "b.py", "c.py", "d.py"] {
            cache.store(&p(f), "lint", vec![f.to_string()]).unwrap();
        }

        let removed = cache.invalidate_transitive(&p("a.py"), 16);
        assert_eq!(removed, 3);
        // d.py is unrelated and survives
        assert_eq!(cache.snapshot_stats().entry_count, 1);
    }

    #[test]
    fn test_depth_bound() {
        let cache = Cache::new();
        cache.record_dependencies(&p("b.py"), &[p("a.py")]);
        cache.record_dependencies(&p("c.py"), &[p("b.py")]);
        for f in ["a.py", "b.py", "c.py"] {
            cache.store(&p(f), "lint", vec![]).unwrap();
        }

        // Depth 1 reaches b but not c
        let removed = cache.invalidate_transitive(&p("a.py"), 1);
        assert_eq!(removed, 2);
        assert_eq!(cache.snapshot_stats().entry_count, 1);
    }

    #[test]
    fn test_cycle_terminates() {
        let cache = Cache::new();
        cache.record_dependencies(&p("a.py"), &[p("b.py")]);
        cache.record_dependencies(&p("b.py"), &[p("a.py")]);
        cache.store(&p("a.py"), "lint", vec![]).unwrap();
        cache.store(&p("b.py"), "lint", vec![]).unwrap();

        let removed = cache.invalidate_transitive(&p("a.py"), 64);
        assert_eq!(removed, 2);
    }

    #[test]
    fn test_edges_replaced_not_merged() {
        let cache = Cache::new();
        cache.record_dependencies(&p("b.py"), &[p("a.py")]);
        // b's imports change: it no longer depends on a
        cache.record_dependencies(&p("b.py"), &[p("z.py")]);
        cache.store(&p("b.py"), "lint", vec![]).unwrap();

        // Changing a must not touch b any more
        assert_eq!(cache.invalidate_transitive(&p("a.py"), 16), 0);
        assert_eq!(cache.invalidate_transitive(&p("z.py"), 16), 1);
    }

    #[test]
    fn test_dependencies_of_reflects_latest_edges() {
        let cache = Cache::new();
        assert!(cache.dependencies_of(&p("b.py")).is_none());

        cache.record_dependencies(&p("b.py"), &[p("z.py"), p("a.py")]);
        assert_eq!(
            cache.dependencies_of(&p("b.py")),
            Some(vec![p("a.py"), p("z.py")])
        );
    }

    #[test]
    fn test_sweep_expired() {
        let cache = Cache::new();
        cache.store(&p("a.py"), "lint", vec![]).unwrap();

        assert_eq!(cache.sweep_expired(Duration::from_secs(3600)), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.sweep_expired(Duration::from_millis(1)), 1);
        assert_eq!(cache.snapshot_stats().entry_count, 0);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let snapshot_path = dir.path().join("incremental.json");

        let cache = Cache::new();
        cache.record_dependencies(&p("b.py"), &[p("a.py")]);
        cache.store(&p("a.py"), "lint", vec!["x".into()]).unwrap();
        cache.save_snapshot(&snapshot_path).unwrap();

        let restored = Cache::new();
        assert_eq!(restored.load_snapshot(&snapshot_path).unwrap(), 1);
        let result = restored
            .get_or_compute(&p("a.py"), "lint", || {
                panic!("should be cached");
            })
            .unwrap();
        assert_eq!(result, vec!["x".to_string()]);

        // Graph survived too
        restored.store(&p("b.py"), "lint", vec![]).unwrap();
        assert_eq!(restored.invalidate_transitive(&p("a.py"), 16), 2);
    }

    #[test]
    fn test_missing_snapshot_is_fresh_start() {
        let cache = Cache::new();
        assert_eq!(
            cache
                .load_snapshot(Path::new("/nonexistent/snapshot.json"))
                .unwrap(),
            0
        );
    }
}
