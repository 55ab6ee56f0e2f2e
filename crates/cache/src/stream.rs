//! Bounded cache for live/event-driven analysis results
//!
//! Values are published into a bounded store (same LRU/pressure eviction as
//! every other level) and fanned out to subscribers through a depth-limited
//! ring. Late subscribers only see values published after they subscribed:
//! at-most-once delivery, no replay buffer beyond the bounded store itself.

use crate::errors::{CacheError, RecoveryHint, Result, SerializationOp};
use crate::store::{EvictableStore, EvictionTuning};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::pin::pin;
use std::sync::Arc;
use tokio::sync::Notify;

/// What `publish` does when the ring is at its depth limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, Serialize)]
pub enum BackpressurePolicy {
    /// Block the producer until a subscriber consumes
    Block,
    /// Drop the oldest unconsumed entry
    DropOldest,
}

#[derive(Clone)]
struct StreamItem<V> {
    seq: u64,
    value: V,
}

struct RingState<V> {
    items: VecDeque<StreamItem<V>>,
    next_seq: u64,
    /// subscriber id -> next sequence number it will read
    cursors: HashMap<u64, u64>,
    next_subscriber_id: u64,
    closed: bool,
}

struct Shared<V> {
    ring: Mutex<RingState<V>>,
    policy: BackpressurePolicy,
    max_depth: usize,
    consumer_notify: Notify,
    producer_notify: Notify,
}

impl<V> Shared<V> {
    /// Drop ring items every registered subscriber has consumed. With no
    /// subscribers everything is trivially consumed.
    fn prune_locked(&self, state: &mut RingState<V>) {
        let min_cursor = state.cursors.values().copied().min();
        match min_cursor {
            Some(min) => {
                while state.items.front().is_some_and(|item| item.seq < min) {
                    state.items.pop_front();
                }
            }
            None => state.items.clear(),
        }
    }
}

/// Bounded, backpressured publish/subscribe cache
pub struct StreamResultCache<V> {
    store: Arc<EvictableStore<V>>,
    shared: Arc<Shared<V>>,
}

impl<V> Clone for StreamResultCache<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V> StreamResultCache<V>
where
    V: Clone + Serialize + Send + 'static,
{
    pub fn new(max_memory_bytes: u64, max_depth: usize, policy: BackpressurePolicy) -> Self {
        Self::with_tuning(
            max_memory_bytes,
            max_depth,
            policy,
            EvictionTuning::default(),
        )
    }

    pub fn with_tuning(
        max_memory_bytes: u64,
        max_depth: usize,
        policy: BackpressurePolicy,
        tuning: EvictionTuning,
    ) -> Self {
        Self {
            store: Arc::new(EvictableStore::with_tuning(max_memory_bytes, tuning)),
            shared: Arc::new(Shared {
                ring: Mutex::new(RingState {
                    items: VecDeque::new(),
                    next_seq: 0,
                    cursors: HashMap::new(),
                    next_subscriber_id: 0,
                    closed: false,
                }),
                policy,
                max_depth: max_depth.max(1),
                consumer_notify: Notify::new(),
                producer_notify: Notify::new(),
            }),
        }
    }

    /// Publish a value.
    ///
    /// The only intentionally blocking cache operation: with `Block` policy
    /// and a full ring this suspends the producer until depth drops (or the
    /// future is cancelled). With `DropOldest` it never suspends.
    pub async fn publish(&self, key: &str, value: V) -> Result<()> {
        let size = bincode::serialized_size(&value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            operation: SerializationOp::Serialize,
            source: e,
            recovery_hint: RecoveryHint::Ignore,
        })?;
        self.store.put(key, value.clone(), size)?;

        loop {
            {
                let mut state = self.shared.ring.lock();
                self.shared.prune_locked(&mut state);

                if state.items.len() < self.shared.max_depth {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    state.items.push_back(StreamItem { seq, value });
                    drop(state);
                    self.shared.consumer_notify.notify_waiters();
                    return Ok(());
                }

                if self.shared.policy == BackpressurePolicy::DropOldest {
                    state.items.pop_front();
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    state.items.push_back(StreamItem { seq, value });
                    drop(state);
                    self.shared.consumer_notify.notify_waiters();
                    return Ok(());
                }
            }

            // Block policy: wait for a consumer to free depth. The waiter is
            // registered before re-checking so a racing consume cannot be
            // missed.
            let mut notified = pin!(self.shared.producer_notify.notified());
            notified.as_mut().enable();
            {
                let mut state = self.shared.ring.lock();
                self.shared.prune_locked(&mut state);
                if state.items.len() < self.shared.max_depth {
                    continue;
                }
            }
            notified.await;
        }
    }

    /// Register a subscriber that yields values published from now on
    pub fn subscribe(&self) -> StreamSubscriber<V> {
        let mut state = self.shared.ring.lock();
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        let cursor = state.next_seq;
        state.cursors.insert(id, cursor);

        StreamSubscriber {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    /// Latest cached value for a key, from the bounded store
    pub fn get(&self, key: &str) -> Option<V> {
        self.store.get(key)
    }

    /// Remove a cached value; pending ring items are unaffected
    pub fn invalidate(&self, key: &str) -> bool {
        self.store.invalidate(key)
    }

    pub fn invalidate_where(&self, predicate: impl Fn(&str) -> bool) -> usize {
        self.store.invalidate_where(predicate)
    }

    /// Close the stream: pending items drain, then subscribers see the end
    pub fn close(&self) {
        self.shared.ring.lock().closed = true;
        self.shared.consumer_notify.notify_waiters();
        self.shared.producer_notify.notify_waiters();
    }

    pub fn snapshot_stats(&self) -> crate::entry::StoreStats {
        self.store.snapshot_stats()
    }

    pub(crate) fn store(&self) -> &EvictableStore<V> {
        &self.store
    }
}

/// A lazy, per-subscriber sequence of published values
pub struct StreamSubscriber<V> {
    shared: Arc<Shared<V>>,
    id: u64,
}

impl<V: Clone> StreamSubscriber<V> {
    /// Next published value, or `None` once the stream is closed and drained
    pub async fn next(&mut self) -> Option<V> {
        loop {
            {
                let mut state = self.shared.ring.lock();
                let cursor = *state.cursors.get(&self.id)?;

                let found = state
                    .items
                    .iter()
                    .find(|item| item.seq >= cursor)
                    .map(|item| (item.seq, item.value.clone()));

                if let Some((seq, value)) = found {
                    state.cursors.insert(self.id, seq + 1);
                    self.shared.prune_locked(&mut state);
                    drop(state);
                    self.shared.producer_notify.notify_waiters();
                    return Some(value);
                }

                if state.closed {
                    return None;
                }
            }

            let mut notified = pin!(self.shared.consumer_notify.notified());
            notified.as_mut().enable();
            {
                let state = self.shared.ring.lock();
                let cursor = *state.cursors.get(&self.id)?;
                if state.items.iter().any(|item| item.seq >= cursor) || state.closed {
                    continue;
                }
            }
            notified.await;
        }
    }
}

impl<V> Drop for StreamSubscriber<V> {
    fn drop(&mut self) {
        let mut state = self.shared.ring.lock();
        state.cursors.remove(&self.id);
        self.shared.prune_locked(&mut state);
        drop(state);
        self.shared.producer_notify.notify_waiters();
    }
}
