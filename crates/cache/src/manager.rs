//! Unified entry point over all cache levels
//!
//! Owns one instance of every level, wires them into the coherence manager,
//! and exposes the operations callers actually use: load-or-compute on the
//! hot path, cascading invalidation on change, warming batches, retention
//! sweeps, and a per-level stats snapshot for observability.

use crate::artifact::ArtifactCache;
use crate::coherence::{CacheLevel, CoherenceManager, CoherentLevel};
use crate::config::CacheConfig;
use crate::content::{FileContent, FileContentCache};
use crate::entry::StoreStats;
use crate::errors::Result;
use crate::incremental::IncrementalCache;
use crate::keys::path_key;
use crate::stream::{StreamResultCache, StreamSubscriber};
use crate::traits::ArtifactParser;
use crate::warming::{
    AccessPatternTracker, DependencyWarmer, MemoryAwareWarmingScheduler, WarmingStrategy,
    WarmingSummary,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Paths remembered as "recently touched" for co-access correlation
const SESSION_WINDOW: usize = 8;

/// Per-level statistics snapshot
#[derive(Debug)]
pub struct CacheStatsReport {
    pub per_level: BTreeMap<String, StoreStats>,
}

/// What a retention sweep removed
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub incremental_expired: usize,
    pub persisted_removed: usize,
}

/// The cache subsystem behind one handle.
///
/// `A` is the parsed-artifact type, `R` the analysis-result type; both are
/// opaque to the cache apart from serialization.
pub struct AnalysisCache<A, R> {
    config: CacheConfig,
    content: Arc<FileContentCache>,
    artifacts: Arc<ArtifactCache<A>>,
    incremental: Arc<IncrementalCache<R>>,
    streams: StreamResultCache<R>,
    coherence: CoherenceManager,
    tracker: Arc<AccessPatternTracker>,
    scheduler: MemoryAwareWarmingScheduler<A, R>,
    parser: Arc<dyn ArtifactParser<A>>,
    recent: Mutex<VecDeque<PathBuf>>,
}

impl<A, R> AnalysisCache<A, R>
where
    A: Serialize + DeserializeOwned + Send + Sync + 'static,
    R: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig, parser: Arc<dyn ArtifactParser<A>>) -> Result<Self> {
        config.validate()?;

        let content = Arc::new(FileContentCache::with_tuning(
            config.content_max_bytes,
            config.tuning,
        ));
        let artifacts = Arc::new(ArtifactCache::with_tuning(
            config.artifact_max_bytes,
            config.persist_root.clone(),
            config.tuning,
            config.compression_level,
        ));
        let incremental = Arc::new(IncrementalCache::new());
        let streams = StreamResultCache::with_tuning(
            config.stream_max_bytes,
            config.stream_max_depth,
            config.stream_backpressure,
            config.tuning,
        );

        let mut coherence = CoherenceManager::new(config.coherence_table.clone())?;
        coherence.register_level(
            CacheLevel::FileContent,
            Arc::new(ContentLevel {
                cache: Arc::clone(&content),
            }),
        );
        coherence.register_level(
            CacheLevel::Artifact,
            Arc::new(ArtifactLevel {
                cache: Arc::clone(&artifacts),
            }),
        );
        coherence.register_level(
            CacheLevel::Incremental,
            Arc::new(IncrementalLevel {
                cache: Arc::clone(&incremental),
                max_depth: config.invalidation_max_depth,
            }),
        );
        coherence.register_level(
            CacheLevel::Stream,
            Arc::new(StreamLevel {
                cache: streams.clone(),
            }),
        );

        let tracker = Arc::new(AccessPatternTracker::new());
        let warmer = Arc::new(DependencyWarmer::new(
            Arc::clone(&content),
            Arc::clone(&artifacts),
            Arc::clone(&incremental),
            Arc::clone(&parser),
        ));
        let scheduler = MemoryAwareWarmingScheduler::new(warmer, Arc::clone(&tracker));

        Ok(Self {
            config,
            content,
            artifacts,
            incremental,
            streams,
            coherence,
            tracker,
            scheduler,
            parser,
            recent: Mutex::new(VecDeque::with_capacity(SESSION_WINDOW)),
        })
    }

    /// Raw content for a path, loaded and cached with mtime validation
    pub fn get_or_load_content(&self, path: &Path) -> Result<FileContent> {
        self.content.get_or_load(path)
    }

    /// The parsed artifact for a path, computed through every level that can
    /// answer faster than the parser.
    ///
    /// Side effects of a call: the file's dependency edges are refreshed from
    /// its static imports, and the access is recorded (with the session's
    /// recently touched paths as co-accesses) for predictive warming.
    pub fn get_or_compute_artifact(&self, path: &Path) -> Result<Arc<A>> {
        let content = self.content.get_or_load(path)?;
        let artifact = self.artifacts.get_or_parse(
            path,
            &content.identity,
            &content.bytes,
            self.parser.as_ref(),
        )?;

        let imports = self.parser.extract_static_imports(&artifact);
        self.incremental.record_dependencies(path, &imports);
        self.note_access(path);

        Ok(artifact)
    }

    /// A partial analysis result for (scope, kind), computed on miss
    pub fn get_or_compute_incremental(
        &self,
        scope: &Path,
        kind: &str,
        compute: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        self.incremental.get_or_compute(scope, kind, compute)
    }

    /// Publish a live analysis result to stream subscribers
    pub async fn publish_result(&self, key: &str, result: R) -> Result<()> {
        self.streams.publish(key, result).await
    }

    /// Subscribe to results published from now on
    pub fn subscribe_results(&self) -> StreamSubscriber<R> {
        self.streams.subscribe()
    }

    /// Latest published result for a key
    pub fn latest_result(&self, key: &str) -> Option<R> {
        self.streams.get(key)
    }

    /// Invalidate a path at `origin` and cascade to every dependent level
    /// per the configured table. Returns the number of entries removed.
    pub fn invalidate(&self, origin: CacheLevel, path: &Path) -> usize {
        self.coherence.invalidate_cascade(origin, &path_key(path))
    }

    /// React to an observed file change: a full cascade from the content
    /// level
    pub fn on_file_changed(&self, path: &Path) -> usize {
        self.invalidate(CacheLevel::FileContent, path)
    }

    /// Run one warming batch
    pub async fn warm(&self, strategy: &WarmingStrategy) -> Result<WarmingSummary> {
        self.scheduler.warm(strategy).await
    }

    /// Stop the in-flight warming batch at the next file boundary
    pub fn cancel_warming(&self) {
        self.scheduler.request_cancel();
    }

    /// When the tracker expects `path` to be needed next, if it has enough
    /// history to say
    pub fn predict_next_access(&self, path: &Path) -> Option<SystemTime> {
        self.tracker.predict_next_access(path)
    }

    /// Per-level statistics, keyed by level name
    pub fn stats(&self) -> CacheStatsReport {
        let mut per_level = BTreeMap::new();
        per_level.insert(
            CacheLevel::FileContent.as_str().to_string(),
            self.content.snapshot_stats(),
        );
        per_level.insert(
            CacheLevel::Artifact.as_str().to_string(),
            self.artifacts.snapshot_stats(),
        );
        per_level.insert(
            CacheLevel::Incremental.as_str().to_string(),
            self.incremental.snapshot_stats(),
        );
        per_level.insert(
            CacheLevel::Stream.as_str().to_string(),
            self.streams.snapshot_stats(),
        );
        CacheStatsReport { per_level }
    }

    /// Retention sweep over the incremental entries and the persisted
    /// artifact files. Invoked by the embedding application's scheduler.
    pub fn sweep(&self) -> Result<SweepOutcome> {
        let incremental_expired = self
            .incremental
            .sweep_expired(self.config.incremental_retention);
        let persisted_removed = self
            .artifacts
            .sweep_persisted(self.config.incremental_retention)?;
        Ok(SweepOutcome {
            incremental_expired,
            persisted_removed,
        })
    }

    /// Persist the incremental cache for the next session, if configured
    pub fn save_snapshot(&self) -> Result<()> {
        match &self.config.incremental_snapshot {
            Some(path) => self.incremental.save_snapshot(path),
            None => Ok(()),
        }
    }

    /// Restore the previous session's incremental cache, if configured.
    /// Returns how many entries were loaded.
    pub fn load_snapshot(&self) -> Result<usize> {
        match &self.config.incremental_snapshot {
            Some(path) => self.incremental.load_snapshot(path),
            None => Ok(0),
        }
    }

    fn note_access(&self, path: &Path) {
        let co_accessed: Vec<PathBuf> = {
            let mut recent = self.recent.lock();
            let others: Vec<PathBuf> = recent.iter().filter(|p| *p != path).cloned().collect();
            if recent.len() == SESSION_WINDOW {
                recent.pop_front();
            }
            recent.push_back(path.to_path_buf());
            others
        };
        let refs: Vec<&Path> = co_accessed.iter().map(|p| p.as_path()).collect();
        self.tracker.record_access(path, &refs);
    }
}

/// Content level adapter: the cascade key is already the store key
struct ContentLevel {
    cache: Arc<FileContentCache>,
}

impl CoherentLevel for ContentLevel {
    fn invalidate_level_key(&self, key: &str) -> usize {
        usize::from(self.cache.invalidate(Path::new(key)))
    }
}

/// Artifact level adapter: drops every content version of the path
struct ArtifactLevel<A> {
    cache: Arc<ArtifactCache<A>>,
}

impl<A> CoherentLevel for ArtifactLevel<A>
where
    A: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn invalidate_level_key(&self, key: &str) -> usize {
        self.cache.invalidate_path(Path::new(key))
    }
}

/// Incremental level adapter: follows recorded dependency edges
struct IncrementalLevel<R> {
    cache: Arc<IncrementalCache<R>>,
    max_depth: usize,
}

impl<R> CoherentLevel for IncrementalLevel<R>
where
    R: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    fn invalidate_level_key(&self, key: &str) -> usize {
        self.cache
            .invalidate_transitive(Path::new(key), self.max_depth)
    }
}

/// Stream level adapter: drops the path's results, scoped or not
struct StreamLevel<R> {
    cache: StreamResultCache<R>,
}

impl<R> CoherentLevel for StreamLevel<R>
where
    R: Clone + Serialize + Send + Sync + 'static,
{
    fn invalidate_level_key(&self, key: &str) -> usize {
        let scoped = format!("{key}::");
        self.cache
            .invalidate_where(|k| k == key || k.starts_with(&scoped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ParseError;
    use serde::Deserialize;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct ImportList {
        imports: Vec<PathBuf>,
    }

    struct LineImportParser {
        calls: AtomicUsize,
    }

    impl LineImportParser {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl ArtifactParser<ImportList> for LineImportParser {
        fn parse(&self, content: &[u8]) -> std::result::Result<ImportList, ParseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = std::str::from_utf8(content)
                .map_err(|e| ParseError::new(format!("not utf-8: {e}")))?;
            Ok(ImportList {
                imports: text
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(PathBuf::from)
                    .collect(),
            })
        }

        fn extract_static_imports(&self, artifact: &ImportList) -> Vec<PathBuf> {
            artifact.imports.clone()
        }
    }

    type Cache = AnalysisCache<ImportList, Vec<String>>;

    fn config(dir: &TempDir) -> CacheConfig {
        CacheConfig {
            persist_root: Some(dir.path().join("artifacts")),
            incremental_snapshot: Some(dir.path().join("incremental.json")),
            ..Default::default()
        }
    }

    #[test]
    fn test_artifact_computed_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.py");
        fs::write(&path, "x = 1\n").unwrap();

        let parser = LineImportParser::new();
        let cache = Cache::new(config(&dir), parser.clone()).unwrap();

        cache.get_or_compute_artifact(&path).unwrap();
        cache.get_or_compute_artifact(&path).unwrap();
        assert_eq!(parser.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_file_change_cascade_clears_every_level() {
        let dir = TempDir::new().unwrap();
        let dep = dir.path().join("dep.py");
        let root = dir.path().join("root.py");
        fs::write(&dep, "x = 1\n").unwrap();
        fs::write(&root, format!("{}\n", dep.display())).unwrap();

        let cache = Cache::new(config(&dir), LineImportParser::new()).unwrap();

        cache.get_or_compute_artifact(&root).unwrap();
        cache.get_or_compute_artifact(&dep).unwrap();
        cache
            .get_or_compute_incremental(&root, "lint", || Ok(vec!["finding".into()]))
            .unwrap();
        cache
            .get_or_compute_incremental(&dep, "lint", || Ok(vec![]))
            .unwrap();
        cache
            .publish_result(&path_key(&dep), vec!["stream".into()])
            .await
            .unwrap();

        let removed = cache.on_file_changed(&dep);
        // Content + artifact + both incremental results (dep and its
        // dependent root) + the stream entry
        assert_eq!(removed, 5);

        // The dependent's incremental result must be gone too
        let mut recomputed = false;
        cache
            .get_or_compute_incremental(&root, "lint", || {
                recomputed = true;
                Ok(vec![])
            })
            .unwrap();
        assert!(recomputed);
    }

    #[test]
    fn test_stats_reports_every_level() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(config(&dir), LineImportParser::new()).unwrap();

        let stats = cache.stats();
        for level in ["file-content", "artifact", "incremental", "stream"] {
            assert!(stats.per_level.contains_key(level), "missing {level}");
        }
    }

    #[tokio::test]
    async fn test_warm_through_manager() {
        let dir = TempDir::new().unwrap();
        let dep = dir.path().join("dep.py");
        let root = dir.path().join("root.py");
        fs::write(&dep, "x = 1\n").unwrap();
        fs::write(&root, format!("{}\n", dep.display())).unwrap();

        let parser = LineImportParser::new();
        let cache = Cache::new(config(&dir), parser.clone()).unwrap();

        let strategy = WarmingStrategy {
            priority_paths: vec![root.clone()],
            dependency_depth: 1,
            ..Default::default()
        };
        let summary = cache.warm(&strategy).await.unwrap();
        assert_eq!(summary.warmed, 2);

        // Interactive lookups now hit without parsing again
        let before = parser.calls.load(Ordering::SeqCst);
        cache.get_or_compute_artifact(&root).unwrap();
        assert_eq!(parser.calls.load(Ordering::SeqCst), before);
    }

    #[test]
    fn test_snapshot_roundtrip_through_manager() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.py");
        fs::write(&path, "x = 1\n").unwrap();

        let cache = Cache::new(config(&dir), LineImportParser::new()).unwrap();
        cache
            .get_or_compute_incremental(&path, "lint", || Ok(vec!["r".into()]))
            .unwrap();
        cache.save_snapshot().unwrap();

        let restored = Cache::new(config(&dir), LineImportParser::new()).unwrap();
        assert_eq!(restored.load_snapshot().unwrap(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let bad = CacheConfig {
            compression_level: 99,
            ..config(&dir)
        };
        assert!(Cache::new(bad, LineImportParser::new()).is_err());
    }

    #[test]
    fn test_prediction_after_repeated_access() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.py");
        fs::write(&path, "x = 1\n").unwrap();

        let cache = Cache::new(config(&dir), LineImportParser::new()).unwrap();
        for _ in 0..4 {
            cache.get_or_compute_artifact(&path).unwrap();
        }
        assert!(cache.predict_next_access(&path).is_some());
    }
}
