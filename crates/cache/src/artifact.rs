//! Parsed-artifact cache with optional compressed on-disk persistence
//!
//! In-memory entries are keyed by `ContentIdentity::combined_key`, so
//! validity is an O(1) equality check: identity already encodes content.
//! The disk layer lets a fresh process warm-start without re-parsing; a
//! corrupt persisted entry is deleted and treated as a miss.

use crate::errors::{CacheError, RecoveryHint, Result, SerializationOp};
use crate::keys::ContentIdentity;
use crate::store::{EvictableStore, EvictionTuning, PressureLevel};
use crate::traits::ArtifactParser;
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a bulk warm-load; individual failures never abort the batch
#[derive(Debug, Default)]
pub struct BulkWarmOutcome {
    pub warmed: usize,
    pub failed: Vec<String>,
}

/// Cache of parsed artifacts, generic over the (opaque) artifact type
pub struct ArtifactCache<A> {
    store: EvictableStore<Arc<A>>,
    persist_root: Option<PathBuf>,
    compression_level: i32,
}

impl<A> ArtifactCache<A>
where
    A: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(max_memory_bytes: u64, persist_root: Option<PathBuf>) -> Self {
        Self::with_tuning(
            max_memory_bytes,
            persist_root,
            EvictionTuning::default(),
            3, // zstd default level
        )
    }

    pub fn with_tuning(
        max_memory_bytes: u64,
        persist_root: Option<PathBuf>,
        tuning: EvictionTuning,
        compression_level: i32,
    ) -> Self {
        Self {
            store: EvictableStore::with_tuning(max_memory_bytes, tuning),
            persist_root,
            compression_level,
        }
    }

    /// In-memory lookup by identity
    pub fn get(&self, identity: &ContentIdentity) -> Option<Arc<A>> {
        self.store.get(&identity.combined_key)
    }

    /// Insert an artifact, accounting its serialized size
    pub fn insert(&self, identity: &ContentIdentity, artifact: A) -> Result<Arc<A>> {
        let size = bincode::serialized_size(&artifact).map_err(|e| CacheError::Serialization {
            key: identity.combined_key.clone(),
            operation: SerializationOp::Serialize,
            source: e,
            recovery_hint: RecoveryHint::Ignore,
        })?;
        let artifact = Arc::new(artifact);
        self.store
            .put(&identity.combined_key, Arc::clone(&artifact), size)?;
        Ok(artifact)
    }

    /// Whether the stored entry for this identity is still valid.
    ///
    /// Pure equality on the combined key; nothing is re-hashed.
    pub fn is_valid(&self, identity: &ContentIdentity) -> bool {
        self.store.contains(&identity.combined_key)
    }

    /// Fetch an artifact, falling back to the persisted layer and finally to
    /// the external parser. The parsed result is stored (and persisted when a
    /// persistence root is configured).
    pub fn get_or_parse(
        &self,
        path: &Path,
        identity: &ContentIdentity,
        content: &[u8],
        parser: &dyn ArtifactParser<A>,
    ) -> Result<Arc<A>> {
        if let Some(artifact) = self.get(identity) {
            return Ok(artifact);
        }

        if let Some(artifact) = self.load_persisted(identity)? {
            return self.insert(identity, artifact);
        }

        let artifact = parser
            .parse(content)
            .map_err(|e| CacheError::ParseFailure {
                path: path.to_path_buf(),
                message: e.message,
                recovery_hint: RecoveryHint::Ignore,
            })?;

        let artifact = self.insert(identity, artifact)?;
        if self.persist_root.is_some() {
            if let Err(e) = self.persist(identity, &artifact) {
                // Persistence is best-effort; the in-memory entry stands
                tracing::warn!(key = %identity.combined_key, error = %e, "failed to persist artifact");
            }
        }
        Ok(artifact)
    }

    /// Serialize, compress, and atomically write the artifact under a path
    /// derived from the combined key
    pub fn persist(&self, identity: &ContentIdentity, artifact: &A) -> Result<()> {
        let path = self
            .persisted_path(identity)
            .ok_or_else(|| CacheError::configuration("no persistence root configured"))?;

        let serialized =
            bincode::serialize(artifact).map_err(|e| CacheError::Serialization {
                key: identity.combined_key.clone(),
                operation: SerializationOp::Serialize,
                source: e,
                recovery_hint: RecoveryHint::Ignore,
            })?;
        let compressed = zstd::encode_all(serialized.as_slice(), self.compression_level)
            .map_err(|e| CacheError::Io {
                path: path.clone(),
                operation: "compress artifact",
                source: e,
                recovery_hint: RecoveryHint::Ignore,
            })?;

        scour_utils::write_atomic(&path, &compressed).map_err(|e| CacheError::Io {
            path: path.clone(),
            operation: "write persisted artifact",
            source: e,
            recovery_hint: RecoveryHint::CheckPermissions { path: path.clone() },
        })?;

        tracing::debug!(key = %identity.combined_key, bytes = compressed.len(), "persisted artifact");
        Ok(())
    }

    /// Attempt to load a persisted artifact.
    ///
    /// Absence is a plain miss (`Ok(None)`). A file that fails to decompress
    /// or deserialize is deleted and also reported as a miss.
    pub fn load_persisted(&self, identity: &ContentIdentity) -> Result<Option<A>> {
        let Some(path) = self.persisted_path(identity) else {
            return Ok(None);
        };

        let compressed = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::Io {
                    path,
                    operation: "read persisted artifact",
                    source: e,
                    recovery_hint: RecoveryHint::Retry {
                        after: Duration::from_millis(50),
                    },
                })
            }
        };

        match Self::decode(identity, &compressed) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(e) => {
                tracing::warn!(key = %identity.combined_key, error = %e, "deleting corrupt persisted artifact");
                let _ = std::fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    /// Load a list of persisted artifacts concurrently, bounded by
    /// `parallelism` workers.
    pub async fn bulk_warm(
        &self,
        identities: &[ContentIdentity],
        parallelism: usize,
    ) -> BulkWarmOutcome {
        let parallelism = parallelism.max(1);

        let results: Vec<std::result::Result<(), String>> =
            stream::iter(identities.iter().cloned())
                .map(|identity| async move {
                    match self.load_persisted_async(&identity).await {
                        Ok(Some(artifact)) => self
                            .insert(&identity, artifact)
                            .map(|_| ())
                            .map_err(|_| identity.combined_key.clone()),
                        Ok(None) => Err(identity.combined_key.clone()),
                        Err(e) => {
                            tracing::debug!(key = %identity.combined_key, error = %e, "bulk warm failed");
                            Err(identity.combined_key.clone())
                        }
                    }
                })
                .buffer_unordered(parallelism)
                .collect()
                .await;

        let mut outcome = BulkWarmOutcome::default();
        for result in results {
            match result {
                Ok(()) => outcome.warmed += 1,
                Err(key) => outcome.failed.push(key),
            }
        }
        outcome
    }

    /// Delete persisted artifacts older than `max_age`; returns how many were
    /// removed. Invoked by the external scheduler, like the incremental
    /// cache's retention sweep.
    pub fn sweep_persisted(&self, max_age: Duration) -> Result<usize> {
        let Some(root) = &self.persist_root else {
            return Ok(0);
        };
        if !root.exists() {
            return Ok(0);
        }

        let cutoff = std::time::SystemTime::now() - max_age;
        let mut removed = 0;

        for shard in std::fs::read_dir(root).map_err(|e| CacheError::Io {
            path: root.clone(),
            operation: "read persistence root",
            source: e,
            recovery_hint: RecoveryHint::CheckPermissions { path: root.clone() },
        })? {
            let Ok(shard) = shard else { continue };
            if !shard.path().is_dir() {
                continue;
            }
            let Ok(entries) = std::fs::read_dir(shard.path()) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let stale = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .map(|mtime| mtime < cutoff)
                    .unwrap_or(false);
                if stale && std::fs::remove_file(entry.path()).is_ok() {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "swept stale persisted artifacts");
        }
        Ok(removed)
    }

    /// Invalidate the in-memory entry for an identity
    pub fn invalidate(&self, identity: &ContentIdentity) -> bool {
        self.store.invalidate(&identity.combined_key)
    }

    /// Invalidate every in-memory entry for a path, regardless of content
    /// version
    pub fn invalidate_path(&self, path: &Path) -> usize {
        let prefix = ContentIdentity::path_key_prefix(path);
        self.store.invalidate_where(|key| key.starts_with(&prefix))
    }

    pub fn snapshot_stats(&self) -> crate::entry::StoreStats {
        self.store.snapshot_stats()
    }

    /// Pressure signal consulted by the warming scheduler
    pub fn pressure_level(&self) -> PressureLevel {
        self.store.pressure_level()
    }

    pub fn usage_ratio(&self) -> f64 {
        self.store.usage_ratio()
    }

    pub(crate) fn store(&self) -> &EvictableStore<Arc<A>> {
        &self.store
    }

    async fn load_persisted_async(&self, identity: &ContentIdentity) -> Result<Option<A>> {
        let Some(path) = self.persisted_path(identity) else {
            return Ok(None);
        };

        let compressed = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::Io {
                    path,
                    operation: "read persisted artifact",
                    source: e,
                    recovery_hint: RecoveryHint::Retry {
                        after: Duration::from_millis(50),
                    },
                })
            }
        };

        match Self::decode(identity, &compressed) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(e) => {
                tracing::warn!(key = %identity.combined_key, error = %e, "deleting corrupt persisted artifact");
                let _ = tokio::fs::remove_file(&path).await;
                Ok(None)
            }
        }
    }

    fn decode(identity: &ContentIdentity, compressed: &[u8]) -> Result<A> {
        let serialized = zstd::decode_all(compressed).map_err(|e| CacheError::PersistenceCorrupt {
            key: identity.combined_key.clone(),
            reason: format!("decompression failed: {e}"),
            recovery_hint: RecoveryHint::Recreate,
        })?;
        bincode::deserialize(&serialized).map_err(|e| CacheError::PersistenceCorrupt {
            key: identity.combined_key.clone(),
            reason: format!("deserialization failed: {e}"),
            recovery_hint: RecoveryHint::Recreate,
        })
    }

    /// Two-character fan-out below the root keeps directories small
    fn persisted_path(&self, identity: &ContentIdentity) -> Option<PathBuf> {
        let root = self.persist_root.as_ref()?;
        let key = &identity.combined_key;
        Some(root.join(&key[..2]).join(format!("{key}.zst")))
    }
}
