use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use tracing::trace;

/// Stage whose result is memoized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    Prepare,
    Chain,
    Sample,
}

/// Memo key: stage identity, fingerprint and row count of the stage input,
/// and fingerprint of whatever state the stage reads.
///
/// Fingerprints are 64-bit hashes, so two distinct inputs can in principle
/// share a key. Carrying the row count narrows that to same-sized inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageKey {
    pub stage: StageId,
    pub input: u64,
    pub rows: usize,
    pub state: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded memo table with first-in first-out eviction.
#[derive(Debug)]
pub struct MemoCache<K, V> {
    entries: HashMap<K, Arc<V>>,
    order: VecDeque<K>,
    capacity: usize,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone + std::fmt::Debug, V> MemoCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            stats: CacheStats::default(),
        }
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    pub fn get_or_insert_with(&mut self, key: K, compute: impl FnOnce() -> V) -> Arc<V> {
        if let Some(value) = self.entries.get(&key) {
            self.stats.hits += 1;
            trace!(?key, "memo hit");
            return Arc::clone(value);
        }

        self.stats.misses += 1;
        trace!(?key, "memo miss");
        let value = Arc::new(compute());
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                self.stats.evictions += 1;
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, Arc::clone(&value));
        value
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
