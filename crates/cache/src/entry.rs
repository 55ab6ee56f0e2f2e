//! Cache entry bookkeeping and per-store statistics

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// A stored value plus its accounting metadata.
///
/// Owned exclusively by one store; cross-level references go through
/// `ContentIdentity` values, never through shared pointers into entries.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Store key
    pub key: String,
    /// The cached value
    pub value: V,
    /// Accounted size in bytes
    pub size_bytes: u64,
    /// Wall-clock creation time
    pub created_at: SystemTime,
    /// Logical tick of creation (monotonic per store)
    pub created_tick: u64,
    /// Logical tick of the most recent access
    pub last_access_tick: u64,
    /// Number of `get` hits
    pub access_count: u64,
}

/// Point-in-time statistics snapshot for one store.
///
/// Hit/miss/eviction counters accumulate monotonically from store creation;
/// bytes and entry count reflect the moment of the snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_bytes: u64,
    pub entry_count: u64,
}

impl StoreStats {
    /// Hit rate in [0, 1]; 0 when no lookups have happened yet
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
