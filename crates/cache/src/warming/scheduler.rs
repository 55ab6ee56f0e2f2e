//! Memory-aware warming batches
//!
//! Breadth-first, layer-by-layer traversal from the strategy's priority
//! roots. File I/O and parsing run on the blocking pool; a semaphore bounds
//! concurrency to the strategy's parallelism. The pressure signal is
//! consulted before each warm operation, and crossing the threshold stops
//! the batch with a partial summary rather than an error.

use crate::keys::path_key;
use crate::warming::tracker::AccessPatternTracker;
use crate::warming::types::{WarmingStrategy, WarmingSummary};
use crate::warming::warmer::DependencyWarmer;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

enum WarmOutcome {
    Warmed(Vec<PathBuf>),
    SkippedForPressure,
    Cancelled,
    Failed(PathBuf, String),
}

pub struct MemoryAwareWarmingScheduler<A, R> {
    warmer: Arc<DependencyWarmer<A, R>>,
    tracker: Arc<AccessPatternTracker>,
    cancel: Arc<AtomicBool>,
}

impl<A, R> MemoryAwareWarmingScheduler<A, R>
where
    A: Serialize + DeserializeOwned + Send + Sync + 'static,
    R: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new(warmer: Arc<DependencyWarmer<A, R>>, tracker: Arc<AccessPatternTracker>) -> Self {
        Self {
            warmer,
            tracker,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal the in-flight batch (and any future one, until cleared) to
    /// stop. Checked between file operations, never mid-file; the batch
    /// still returns its partial summary.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn clear_cancel(&self) {
        self.cancel.store(false, Ordering::SeqCst);
    }

    /// Run one warming batch and report what happened.
    ///
    /// Every path is visited at most once per batch, keyed by path rather
    /// than content identity, so a file changing mid-traversal cannot cause
    /// redundant I/O. Per-file failures land in the summary's `failed` list
    /// and never abort the batch.
    pub async fn warm(&self, strategy: &WarmingStrategy) -> crate::errors::Result<WarmingSummary> {
        strategy.validate()?;
        let started = Instant::now();

        let mut summary = WarmingSummary::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<PathBuf> = Vec::new();

        for root in &strategy.priority_paths {
            if visited.insert(path_key(root)) {
                frontier.push(root.clone());
            }
            // Files habitually opened together with the root are warmed in
            // the same layer even without an import edge
            for correlated in self.tracker.top_correlated(root, strategy.correlation_seeds) {
                if visited.insert(correlated.clone()) {
                    frontier.push(PathBuf::from(correlated));
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(strategy.parallelism));
        let pressure_stop = Arc::new(AtomicBool::new(false));
        let mut depth = 0;

        while !frontier.is_empty() {
            let mut workers: JoinSet<WarmOutcome> = JoinSet::new();
            for path in frontier.drain(..) {
                workers.spawn(self.spawn_warm(
                    path,
                    Arc::clone(&semaphore),
                    Arc::clone(&pressure_stop),
                    strategy.memory_pressure_threshold,
                ));
            }

            let mut next: Vec<PathBuf> = Vec::new();
            while let Some(joined) = workers.join_next().await {
                let Ok(outcome) = joined else {
                    tracing::warn!("warming worker panicked");
                    continue;
                };
                match outcome {
                    WarmOutcome::Warmed(imports) => {
                        summary.warmed += 1;
                        if depth < strategy.dependency_depth {
                            for import in imports {
                                if visited.insert(path_key(&import)) {
                                    next.push(import);
                                }
                            }
                        }
                    }
                    WarmOutcome::SkippedForPressure => summary.skipped_due_to_pressure += 1,
                    WarmOutcome::Cancelled => {}
                    WarmOutcome::Failed(path, reason) => summary.failed.push((path, reason)),
                }
            }

            if pressure_stop.load(Ordering::SeqCst) || self.cancel.load(Ordering::SeqCst) {
                break;
            }
            frontier = next;
            depth += 1;
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            warmed = summary.warmed,
            skipped = summary.skipped_due_to_pressure,
            failed = summary.failed.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "warming batch finished"
        );
        Ok(summary)
    }

    fn spawn_warm(
        &self,
        path: PathBuf,
        semaphore: Arc<Semaphore>,
        pressure_stop: Arc<AtomicBool>,
        threshold: f64,
    ) -> impl std::future::Future<Output = WarmOutcome> + Send + 'static {
        let warmer = Arc::clone(&self.warmer);
        let cancel = Arc::clone(&self.cancel);
        async move {
            // The permit is taken before the pressure check so the reading
            // reflects work already completed, not work still queued
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return WarmOutcome::Cancelled;
            };
            if cancel.load(Ordering::SeqCst) {
                return WarmOutcome::Cancelled;
            }
            if pressure_stop.load(Ordering::SeqCst) || warmer.usage_ratio() >= threshold {
                pressure_stop.store(true, Ordering::SeqCst);
                return WarmOutcome::SkippedForPressure;
            }

            let blocking_path = path.clone();
            let result =
                tokio::task::spawn_blocking(move || warmer.warm_one(&blocking_path)).await;
            match result {
                Ok(Ok(imports)) => WarmOutcome::Warmed(imports),
                Ok(Err(e)) => WarmOutcome::Failed(path, e.to_string()),
                Err(e) => WarmOutcome::Failed(path, format!("worker failed: {e}")),
            }
        }
    }
}
