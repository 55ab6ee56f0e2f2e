//! Raw file content cache with modification-time validation
//!
//! The single point where content change is detected: a hit is re-validated
//! against the filesystem's current mtime, and a mismatch forces a re-read
//! and a fresh `ContentIdentity`.

use crate::errors::{CacheError, RecoveryHint, Result};
use crate::keys::{path_key, ContentIdentity};
use crate::store::{EvictableStore, EvictionTuning};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// One cached file: raw bytes, derived identity, and the mtime observed at
/// read time
#[derive(Debug, Clone)]
pub struct FileContent {
    pub bytes: Arc<Vec<u8>>,
    pub identity: ContentIdentity,
    pub mtime: SystemTime,
}

/// Cache of raw file content keyed by normalized path
pub struct FileContentCache {
    store: EvictableStore<FileContent>,
}

impl FileContentCache {
    pub fn new(max_memory_bytes: u64) -> Self {
        Self {
            store: EvictableStore::new(max_memory_bytes),
        }
    }

    pub fn with_tuning(max_memory_bytes: u64, tuning: EvictionTuning) -> Self {
        Self {
            store: EvictableStore::with_tuning(max_memory_bytes, tuning),
        }
    }

    /// Fetch the file's content and identity, reading from disk on a miss or
    /// when the cached mtime no longer matches the filesystem.
    ///
    /// A failed read surfaces as `ContentUnavailable` and leaves the store
    /// untouched; there is no negative caching, so the next call re-attempts
    /// the I/O.
    pub fn get_or_load(&self, path: &Path) -> Result<FileContent> {
        let key = path_key(path);

        if let Some(cached) = self.store.get(&key) {
            match current_mtime(path) {
                Ok(mtime) if mtime == cached.mtime => return Ok(cached),
                Ok(_) => {
                    tracing::debug!(path = %path.display(), "mtime changed, re-reading");
                }
                Err(err) => {
                    // File became unreadable; report it without touching the
                    // cached entry
                    return Err(err);
                }
            }
        }

        let content = self.load(path)?;
        self.store
            .put(&key, content.clone(), content.bytes.len() as u64)?;
        Ok(content)
    }

    /// Drop the cached content for a path; returns whether anything was
    /// removed
    pub fn invalidate(&self, path: &Path) -> bool {
        self.store.invalidate(&path_key(path))
    }

    pub fn snapshot_stats(&self) -> crate::entry::StoreStats {
        self.store.snapshot_stats()
    }

    /// Fraction of the memory budget in use
    pub fn usage_ratio(&self) -> f64 {
        self.store.usage_ratio()
    }

    pub(crate) fn store(&self) -> &EvictableStore<FileContent> {
        &self.store
    }

    fn load(&self, path: &Path) -> Result<FileContent> {
        let bytes = fs::read(path).map_err(|e| CacheError::ContentUnavailable {
            path: path.to_path_buf(),
            operation: "read source file",
            source: e,
            recovery_hint: RecoveryHint::RetryWithBackoff {
                initial_delay_ms: 50,
                max_retries: 3,
                backoff_multiplier: 2.0,
            },
        })?;
        let mtime = current_mtime(path)?;
        let identity = ContentIdentity::derive(path, &bytes);

        Ok(FileContent {
            bytes: Arc::new(bytes),
            identity,
            mtime,
        })
    }
}

fn current_mtime(path: &Path) -> Result<SystemTime> {
    let metadata = fs::metadata(path).map_err(|e| CacheError::ContentUnavailable {
        path: path.to_path_buf(),
        operation: "stat source file",
        source: e,
        recovery_hint: RecoveryHint::Retry {
            after: std::time::Duration::from_millis(50),
        },
    })?;
    metadata
        .modified()
        .map_err(|e| CacheError::ContentUnavailable {
            path: path.to_path_buf(),
            operation: "read mtime",
            source: e,
            recovery_hint: RecoveryHint::Ignore,
        })
}
