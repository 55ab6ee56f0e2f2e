//! End-to-end exercises of the assembled cache subsystem: a simulated
//! editing session driving every level through the manager handle.

use scour_cache::{
    path_key, AnalysisCache, ArtifactParser, CacheConfig, CacheLevel, ParseError, WarmingStrategy,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImportList {
    imports: Vec<PathBuf>,
}

/// Each non-empty line of a file is treated as the path of an import
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
    fn parse(&self, content: &[u8]) -> Result<ImportList, ParseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text =
            std::str::from_utf8(content).map_err(|e| ParseError::new(format!("not utf-8: {e}")))?;
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

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("scour_cache=debug")
        .try_init();
}

fn config(dir: &TempDir) -> CacheConfig {
    CacheConfig {
        persist_root: Some(dir.path().join("artifacts")),
        incremental_snapshot: Some(dir.path().join("incremental.json")),
        ..Default::default()
    }
}

/// util.py <- lib.py <- app.py
fn write_project(dir: &TempDir) -> (PathBuf, PathBuf, PathBuf) {
    let util = dir.path().join("util.py");
    let lib = dir.path().join("lib.py");
    let app = dir.path().join("app.py");
    fs::write(&util, "x = 1\n").unwrap();
    fs::write(&lib, format!("{}\n", util.display())).unwrap();
    fs::write(&app, format!("{}\n", lib.display())).unwrap();
    (util, lib, app)
}

#[tokio::test]
async fn test_editing_session_round_trip() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (util, lib, app) = write_project(&dir);

    let parser = LineImportParser::new();
    let cache = Cache::new(config(&dir), parser.clone()).unwrap();

    // Warm the whole project from the entry point
    let summary = cache
        .warm(&WarmingStrategy {
            priority_paths: vec![app.clone()],
            dependency_depth: 4,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(summary.warmed, 3);
    assert!(summary.failed.is_empty());

    // Interactive work now hits warm caches
    let parses_after_warm = parser.calls.load(Ordering::SeqCst);
    cache.get_or_compute_artifact(&app).unwrap();
    cache.get_or_compute_artifact(&lib).unwrap();
    assert_eq!(parser.calls.load(Ordering::SeqCst), parses_after_warm);

    // Incremental results computed once per (scope, kind)
    let mut computes = 0;
    for _ in 0..2 {
        cache
            .get_or_compute_incremental(&app, "lint", || {
                computes += 1;
                Ok(vec!["warning".into()])
            })
            .unwrap();
    }
    assert_eq!(computes, 1);

    // Live result delivery
    let mut sub = cache.subscribe_results();
    cache
        .publish_result(&path_key(&app), vec!["live".into()])
        .await
        .unwrap();
    assert_eq!(sub.next().await, Some(vec!["live".to_string()]));

    // Editing util.py cascades through every level that saw it
    fs::write(&util, "x = 2\n").unwrap();
    let removed = cache.on_file_changed(&util);
    assert!(removed > 0);

    // The dependent chain's incremental results were dropped with it
    let mut recomputed = false;
    cache
        .get_or_compute_incremental(&app, "lint", || {
            recomputed = true;
            Ok(vec![])
        })
        .unwrap();
    assert!(recomputed);

    // Stats cover all four levels and show activity
    let stats = cache.stats();
    assert_eq!(stats.per_level.len(), 4);
    assert!(stats.per_level["artifact"].hits > 0);
}

#[tokio::test]
async fn test_cascade_table_scoping() {
    let dir = TempDir::new().unwrap();
    let (util, _lib, app) = write_project(&dir);

    let cache = Cache::new(config(&dir), LineImportParser::new()).unwrap();
    cache.get_or_compute_artifact(&app).unwrap();
    cache.get_or_compute_artifact(&util).unwrap();

    // An artifact-level invalidation never climbs to the content level
    let content_before = cache.stats().per_level["file-content"].entry_count;
    cache.invalidate(CacheLevel::Artifact, &util);
    assert_eq!(
        cache.stats().per_level["file-content"].entry_count,
        content_before
    );
    // But the artifact itself is gone
    assert_eq!(cache.stats().per_level["artifact"].entry_count, 1);
}

#[test]
fn test_persisted_artifacts_survive_restart() {
    let dir = TempDir::new().unwrap();
    let (util, _lib, _app) = write_project(&dir);

    let first_parser = LineImportParser::new();
    {
        let cache = Cache::new(config(&dir), first_parser.clone()).unwrap();
        cache.get_or_compute_artifact(&util).unwrap();
        cache
            .get_or_compute_incremental(&util, "lint", || Ok(vec!["r".into()]))
            .unwrap();
        cache.save_snapshot().unwrap();
    }
    assert_eq!(first_parser.calls.load(Ordering::SeqCst), 1);

    // A fresh process restores the incremental snapshot and loads the
    // persisted artifact instead of re-parsing
    let second_parser = LineImportParser::new();
    let cache = Cache::new(config(&dir), second_parser.clone()).unwrap();
    assert_eq!(cache.load_snapshot().unwrap(), 1);

    cache.get_or_compute_artifact(&util).unwrap();
    assert_eq!(second_parser.calls.load(Ordering::SeqCst), 0);

    cache
        .get_or_compute_incremental(&util, "lint", || {
            panic!("snapshot should have restored this result");
        })
        .unwrap();
}

#[tokio::test]
async fn test_warming_failures_are_reported_not_raised() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("good.py");
    fs::write(&good, "x = 1\n").unwrap();
    let missing = dir.path().join("missing.py");

    let cache = Cache::new(config(&dir), LineImportParser::new()).unwrap();
    let summary = cache
        .warm(&WarmingStrategy {
            priority_paths: vec![good, missing.clone()],
            dependency_depth: 0,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(summary.warmed, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, missing);
}
