//! In-process LRU tier holding decoded images

use crate::types::CachedImage;
use lru::LruCache;
use std::sync::Arc;
use tracing::debug;

/// Bounded in-memory store; capacity counts entries, not bytes.
///
/// The underlying `LruCache` is unbounded so that a capacity of zero is
/// representable and eviction stays explicit.
#[derive(Debug)]
pub struct MemoryTier<V = Arc<CachedImage>> {
    capacity: usize,
    entries: LruCache<String, V>,
}

impl<V> MemoryTier<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: LruCache::unbounded(),
        }
    }

    /// Look up an entry without changing its recency
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.peek(key)
    }

    /// Insert or overwrite an entry at the most-recently-used position,
    /// evicting least-recently-used entries first if the tier is full.
    pub fn put(&mut self, key: &str, value: V) {
        if self.entries.contains(key) {
            // Replaces the value and moves it to the front
            self.entries.put(key.to_string(), value);
            return;
        }

        if self.capacity == 0 {
            debug!(key = %key, "Memory tier has zero capacity, not admitting");
            return;
        }

        while self.entries.len() >= self.capacity {
            if !self.evict_one() {
                break;
            }
        }

        self.entries.put(key.to_string(), value);
        debug!(key = %key, entries = self.entries.len(), "Admitted to memory tier");
    }

    /// Mark `key` most-recently-used; no-op if absent
    pub fn promote(&mut self, key: &str) -> bool {
        if !self.entries.contains(key) {
            return false;
        }
        self.entries.promote(key);
        true
    }

    /// Drop least-recently-used entries until the tier is within capacity.
    /// Returns the number of entries evicted.
    pub fn evict_to_capacity(&mut self) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.capacity && self.evict_one() {
            evicted += 1;
        }
        evicted
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.pop(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys most-recently-used first
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    fn evict_one(&mut self) -> bool {
        match self.entries.pop_lru() {
            Some((key, _)) => {
                debug!(key = %key, "Evicted least recently used memory entry");
                true
            }
            None => false,
        }
    }
}
