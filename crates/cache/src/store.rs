//! Bounded, thread-safe, size-tracked store used by every cache level
//!
//! One mutex guards the entry map; hit/miss/eviction counters and the byte
//! total live in atomics so `snapshot_stats` and `pressure_level` never take
//! the lock. Recency is tracked with a per-store logical tick rather than
//! wall-clock time, which keeps eviction order deterministic under test.

use crate::entry::{CacheEntry, StoreStats};
use crate::errors::{CacheError, RecoveryHint, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Memory pressure levels derived from the usage ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    /// Below 60% of the memory limit
    Low,
    /// 60-80%: normal operation, evict on overflow only
    Medium,
    /// 80-90%: proactively evict on the next mutating call
    High,
    /// Above 90%: evict before accepting any new entry
    Critical,
}

/// Eviction tuning knobs.
///
/// Ratios are fractions of `max_memory_bytes`. The targets sit below their
/// trigger thresholds so eviction overshoots the boundary instead of
/// thrashing right at it.
#[derive(Debug, Clone, Copy)]
pub struct EvictionTuning {
    /// Usage target after an overflow eviction
    pub overflow_target_ratio: f64,
    /// Usage ratio at which mutating calls proactively evict
    pub proactive_threshold: f64,
    /// Usage target for proactive eviction
    pub proactive_target_ratio: f64,
    /// Usage ratio above which every put evicts before inserting
    pub critical_threshold: f64,
    /// Usage target for critical eviction
    pub critical_target_ratio: f64,
}

impl Default for EvictionTuning {
    fn default() -> Self {
        Self {
            overflow_target_ratio: 0.8,
            proactive_threshold: 0.8,
            proactive_target_ratio: 0.7,
            critical_threshold: 0.9,
            critical_target_ratio: 0.6,
        }
    }
}

/// Generic bounded LRU store with size accounting
pub struct EvictableStore<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    max_memory_bytes: u64,
    tuning: EvictionTuning,
    /// Logical clock; bumped on insert and on every hit
    tick: AtomicU64,
    current_bytes: AtomicU64,
    entry_count: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> EvictableStore<V> {
    pub fn new(max_memory_bytes: u64) -> Self {
        Self::with_tuning(max_memory_bytes, EvictionTuning::default())
    }

    pub fn with_tuning(max_memory_bytes: u64, tuning: EvictionTuning) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_memory_bytes,
            tuning,
            tick: AtomicU64::new(0),
            current_bytes: AtomicU64::new(0),
            entry_count: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a value, updating recency and the access count on a hit.
    ///
    /// Returns a clone of the stored value; concurrent readers never observe
    /// a partially mutated entry.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.last_access_tick = self.tick.fetch_add(1, Ordering::AcqRel) + 1;
                entry.access_count += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace an entry, evicting as needed to hold the size
    /// invariant.
    ///
    /// Rejects entries larger than the store itself: accepting one would
    /// immediately evict everything else and still overflow.
    pub fn put(&self, key: &str, value: V, size_bytes: u64) -> Result<()> {
        if size_bytes > self.max_memory_bytes {
            return Err(CacheError::CapacityExceeded {
                key: key.to_string(),
                requested_bytes: size_bytes,
                max_memory_bytes: self.max_memory_bytes,
                recovery_hint: RecoveryHint::IncreaseCapacity {
                    suggested_bytes: size_bytes * 2,
                },
            });
        }

        let mut entries = self.entries.lock();
        self.evict_for_pressure(&mut entries);

        let now_tick = self.tick.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(old) = entries.remove(key) {
            self.current_bytes.fetch_sub(old.size_bytes, Ordering::AcqRel);
            self.entry_count.fetch_sub(1, Ordering::AcqRel);
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                size_bytes,
                created_at: SystemTime::now(),
                created_tick: now_tick,
                last_access_tick: now_tick,
                access_count: 0,
            },
        );
        self.current_bytes.fetch_add(size_bytes, Ordering::AcqRel);
        self.entry_count.fetch_add(1, Ordering::AcqRel);

        if self.current_bytes.load(Ordering::Acquire) > self.max_memory_bytes {
            let target =
                (self.max_memory_bytes as f64 * self.tuning.overflow_target_ratio) as u64;
            self.evict_down_to(&mut entries, target);
        }

        Ok(())
    }

    /// Remove an entry if present. Idempotent; returns whether anything was
    /// removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        self.evict_for_pressure(&mut entries);
        match entries.remove(key) {
            Some(old) => {
                self.current_bytes.fetch_sub(old.size_bytes, Ordering::AcqRel);
                self.entry_count.fetch_sub(1, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    /// Remove all entries whose key matches the predicate; returns the number
    /// removed. Used for path-prefix bulk invalidation.
    pub fn invalidate_where(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let mut entries = self.entries.lock();
        let doomed: Vec<String> = entries
            .keys()
            .filter(|k| predicate(k))
            .cloned()
            .collect();
        for key in &doomed {
            if let Some(old) = entries.remove(key) {
                self.current_bytes.fetch_sub(old.size_bytes, Ordering::AcqRel);
                self.entry_count.fetch_sub(1, Ordering::AcqRel);
            }
        }
        doomed.len()
    }

    /// Whether a key is currently present, without touching recency
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Drop every entry and reset size accounting (counters keep accumulating)
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.current_bytes.store(0, Ordering::Release);
        self.entry_count.store(0, Ordering::Release);
    }

    /// Lock-free statistics snapshot
    pub fn snapshot_stats(&self) -> StoreStats {
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            current_bytes: self.current_bytes.load(Ordering::Acquire),
            entry_count: self.entry_count.load(Ordering::Acquire),
        }
    }

    /// Current usage as a fraction of the memory limit
    pub fn usage_ratio(&self) -> f64 {
        if self.max_memory_bytes == 0 {
            return 1.0;
        }
        self.current_bytes.load(Ordering::Acquire) as f64 / self.max_memory_bytes as f64
    }

    /// Lock-free pressure signal for the warming scheduler
    pub fn pressure_level(&self) -> PressureLevel {
        let ratio = self.usage_ratio();
        if ratio >= self.tuning.critical_threshold {
            PressureLevel::Critical
        } else if ratio >= self.tuning.proactive_threshold {
            PressureLevel::High
        } else if ratio >= 0.6 {
            PressureLevel::Medium
        } else {
            PressureLevel::Low
        }
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_bytes
    }

    /// Proactive eviction applied at the start of mutating calls, tiered by
    /// the current pressure level.
    fn evict_for_pressure(&self, entries: &mut HashMap<String, CacheEntry<V>>) {
        let ratio = self.usage_ratio();
        if ratio >= self.tuning.critical_threshold {
            let target =
                (self.max_memory_bytes as f64 * self.tuning.critical_target_ratio) as u64;
            self.evict_down_to(entries, target);
        } else if ratio >= self.tuning.proactive_threshold {
            let target =
                (self.max_memory_bytes as f64 * self.tuning.proactive_target_ratio) as u64;
            self.evict_down_to(entries, target);
        }
    }

    /// Evict least-recently-used entries until usage is at or below `target`.
    ///
    /// Ties (identical recency) break toward the lowest access count, then
    /// the oldest creation tick. No I/O happens here; the caller holds the
    /// map lock only as long as removal takes.
    fn evict_down_to(&self, entries: &mut HashMap<String, CacheEntry<V>>, target_bytes: u64) {
        while self.current_bytes.load(Ordering::Acquire) > target_bytes {
            let victim = entries
                .values()
                .min_by_key(|e| (e.last_access_tick, e.access_count, e.created_tick))
                .map(|e| e.key.clone());

            let Some(key) = victim else { break };
            if let Some(old) = entries.remove(&key) {
                self.current_bytes.fetch_sub(old.size_bytes, Ordering::AcqRel);
                self.entry_count.fetch_sub(1, Ordering::AcqRel);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, size = old.size_bytes, "evicted cache entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max: u64) -> EvictableStore<String> {
        EvictableStore::new(max)
    }

    #[test]
    fn test_get_put_roundtrip() {
        let s = store(1000);
        s.put("a", "alpha".to_string(), 10).unwrap();
        assert_eq!(s.get("a"), Some("alpha".to_string()));
        assert_eq!(s.get("b"), None);
    }

    #[test]
    fn test_lru_eviction_on_overflow() {
        let s = store(100);
        s.put("first", "x".to_string(), 60).unwrap();
        s.put("second", "y".to_string(), 60).unwrap();

        // 120 > 100: the older entry goes
        assert_eq!(s.get("first"), None);
        assert_eq!(s.get("second"), Some("y".to_string()));
        assert!(s.snapshot_stats().evictions >= 1);
    }

    #[test]
    fn test_size_invariant_holds() {
        let s = store(100);
        for i in 0..20 {
            s.put(&format!("k{i}"), "v".to_string(), 30).unwrap();
            assert!(s.snapshot_stats().current_bytes <= 100);
        }
    }

    #[test]
    fn test_recent_access_protects_from_eviction() {
        let s = store(100);
        s.put("a", "a".to_string(), 40).unwrap();
        s.put("b", "b".to_string(), 40).unwrap();
        // Touch "a" so "b" becomes the LRU entry
        assert!(s.get("a").is_some());
        s.put("c", "c".to_string(), 40).unwrap();

        assert!(s.contains("a"));
        assert!(!s.contains("b"));
    }

    #[test]
    fn test_oversized_entry_rejected() {
        let s = store(100);
        let err = s.put("huge", "h".to_string(), 101).unwrap_err();
        assert!(matches!(err, CacheError::CapacityExceeded { .. }));
        assert_eq!(s.snapshot_stats().entry_count, 0);
    }

    #[test]
    fn test_invalidate_idempotent() {
        let s = store(100);
        s.put("a", "a".to_string(), 10).unwrap();
        assert!(s.invalidate("a"));
        assert!(!s.invalidate("a"));
    }

    #[test]
    fn test_invalidate_where_prefix() {
        let s = store(1000);
        s.put("pkg/a", "a".to_string(), 10).unwrap();
        s.put("pkg/b", "b".to_string(), 10).unwrap();
        s.put("other/c", "c".to_string(), 10).unwrap();

        let removed = s.invalidate_where(|k| k.starts_with("pkg/"));
        assert_eq!(removed, 2);
        assert!(s.contains("other/c"));
    }

    #[test]
    fn test_replace_adjusts_size_accounting() {
        let s = store(100);
        s.put("a", "a".to_string(), 50).unwrap();
        s.put("a", "a2".to_string(), 20).unwrap();
        assert_eq!(s.snapshot_stats().current_bytes, 20);
        assert_eq!(s.snapshot_stats().entry_count, 1);
    }

    #[test]
    fn test_pressure_levels() {
        let s = store(100);
        assert_eq!(s.pressure_level(), PressureLevel::Low);
        s.put("a", "a".to_string(), 65).unwrap();
        assert_eq!(s.pressure_level(), PressureLevel::Medium);
        s.put("b", "b".to_string(), 20).unwrap();
        assert_eq!(s.pressure_level(), PressureLevel::High);
    }

    #[test]
    fn test_critical_pressure_evicts_before_insert() {
        let s = store(100);
        s.put("a", "a".to_string(), 50).unwrap();
        s.put("b", "b".to_string(), 45).unwrap();
        // 95% usage is critical; the next put must first evict down to 60%
        assert_eq!(s.pressure_level(), PressureLevel::Critical);
        s.put("c", "c".to_string(), 10).unwrap();
        assert!(s.snapshot_stats().current_bytes <= 70);
    }

    #[test]
    fn test_stats_accumulate() {
        let s = store(100);
        s.put("a", "a".to_string(), 10).unwrap();
        s.get("a");
        s.get("a");
        s.get("missing");

        let stats = s.snapshot_stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_clear() {
        let s = store(100);
        s.put("a", "a".to_string(), 10).unwrap();
        s.clear();
        assert_eq!(s.snapshot_stats().entry_count, 0);
        assert_eq!(s.snapshot_stats().current_bytes, 0);
        assert!(!s.contains("a"));
    }
}
