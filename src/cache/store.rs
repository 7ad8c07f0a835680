//! Cache Store Module
//!
//! The synchronous cache engine: HashMap storage, eviction-queue ordering,
//! TTL expiration, and byte accounting. The async `Cache` handle wraps this
//! behind a lock; everything here runs to completion with `&mut self`.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;

use rand::seq::IteratorRandom;
use serde_json::Value;
use tracing::debug;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{size, CacheEntry, EntryView, EvictionPolicy, EvictionQueue};
use crate::config::CacheConfig;

// == Cache Core ==
/// The cache engine proper: entry storage, capacity enforcement, and lazy
/// expiry.
#[derive(Debug)]
pub struct CacheCore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Victim ordering for eviction
    queue: EvictionQueue,
    /// Running estimated size of all entries
    total_bytes: u64,
    /// Immutable instance configuration
    config: CacheConfig,
}

impl CacheCore {
    // == Constructor ==
    /// Creates a new engine with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            queue: EvictionQueue::new(),
            total_bytes: 0,
            config,
        }
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn is_lru(&self) -> bool {
        self.config.eviction_policy == EvictionPolicy::Lru
    }

    // == Set ==
    /// Stores a key-value pair.
    ///
    /// Overwriting preserves the original creation time and recomputes the
    /// expiry deadline; inserting a new key first enforces the capacity
    /// bound. A write is never rejected: when the byte budget cannot be met
    /// even after evicting every other entry, the oversized entry is admitted
    /// anyway.
    pub fn set(&mut self, key: String, value: Value) {
        let new_cost = size::entry_cost(&key, &value);
        let old_cost = self
            .entries
            .get(&key)
            .map(|e| size::entry_cost(&key, &e.value))
            .unwrap_or(0);
        let is_overwrite = self.entries.contains_key(&key);

        self.enforce_capacity(&key, new_cost, old_cost, is_overwrite);

        let now = current_timestamp_ms();
        let expires_at = self.config.ttl_millis.map(|ttl| now + ttl);
        let lru = self.is_lru();

        match self.entries.entry(key) {
            MapEntry::Occupied(mut slot) => {
                let key = slot.key().clone();
                let entry = slot.get_mut();
                entry.value = value;
                entry.expires_at = expires_at;
                if lru {
                    entry.last_accessed = Some(now);
                    self.queue.touch(&key);
                }
                self.total_bytes = self.total_bytes - old_cost + new_cost;
            }
            MapEntry::Vacant(slot) => {
                let mut entry = CacheEntry::new(value, self.config.ttl_millis);
                if lru {
                    entry.last_accessed = Some(entry.created_at);
                }
                self.queue.record_insert(slot.key());
                slot.insert(entry);
                self.total_bytes += new_cost;
            }
        }
    }

    // == Capacity Enforcement ==
    /// Makes room for a write of `new_cost` bytes.
    ///
    /// The byte budget dominates the count bound when both are configured.
    /// The key being written is never selected as a victim.
    fn enforce_capacity(&mut self, key: &str, new_cost: u64, old_cost: u64, is_overwrite: bool) {
        if let Some(budget) = self.config.max_bytes {
            while self.total_bytes - old_cost + new_cost > budget {
                let victim = match self.queue.victim_excluding(Some(key)) {
                    Some(v) => v.clone(),
                    // Nothing left to evict: admit the oversized entry
                    None => break,
                };
                debug!(victim = %victim, "evicting entry to satisfy byte budget");
                self.remove_entry(&victim);
            }
        } else if let Some(max) = self.config.max_entries {
            if !is_overwrite && self.entries.len() >= max {
                if let Some(victim) = self.queue.victim_excluding(Some(key)).cloned() {
                    debug!(victim = %victim, "evicting entry to satisfy entry limit");
                    self.remove_entry(&victim);
                }
            }
        }
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are removed as a side effect and reported absent.
    /// Under LRU the access is recorded; with `auto_delete_after_use` the
    /// entry is removed once its value is taken.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        if self.expire_if_needed(key) {
            return None;
        }
        if self.config.auto_delete_after_use {
            return self.remove_entry(key).map(|e| e.value);
        }
        let lru = self.is_lru();
        let entry = self.entries.get_mut(key)?;
        if lru {
            entry.touch();
        }
        let value = entry.value.clone();
        if lru {
            self.queue.touch(key);
        }
        Some(value)
    }

    // == Peek ==
    /// Reads a value without side effects.
    ///
    /// Reports absence for expired entries but neither removes them nor
    /// records the access.
    pub fn peek(&self, key: &str) -> Option<Value> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            return None;
        }
        Some(entry.value.clone())
    }

    // == Has ==
    /// Checks for a live entry.
    ///
    /// A non-peek read: expired entries are swept and, under LRU, the access
    /// is recorded. The entry itself is never consumed.
    pub fn has(&mut self, key: &str) -> bool {
        if self.expire_if_needed(key) {
            return false;
        }
        let lru = self.is_lru();
        match self.entries.get_mut(key) {
            Some(entry) => {
                if lru {
                    entry.touch();
                    self.queue.touch(key);
                }
                true
            }
            None => false,
        }
    }

    // == Get Entry ==
    /// Returns a metadata snapshot of a live entry, with derived age and
    /// remaining-TTL fields.
    pub fn get_entry(&mut self, key: &str) -> Option<EntryView> {
        if self.expire_if_needed(key) {
            return None;
        }
        let lru = self.is_lru();
        let entry = self.entries.get_mut(key)?;
        if lru {
            entry.touch();
        }
        let view = EntryView::from_entry(key, entry);
        if lru {
            self.queue.touch(key);
        }
        Some(view)
    }

    // == Delete ==
    /// Removes an entry, returning its value if it existed.
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.remove_entry(key).map(|e| e.value)
    }

    // == Clear ==
    /// Removes every entry unconditionally. Returns the number removed.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.queue.clear();
        self.total_bytes = 0;
        count
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and returns the count removed.
    ///
    /// A no-op without a configured TTL, since no entry can carry a deadline.
    pub fn cleanup_expired(&mut self) -> usize {
        if self.config.ttl_millis.is_none() {
            return 0;
        }

        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();
        for key in expired_keys {
            self.remove_entry(&key);
        }

        if count > 0 {
            debug!(removed = count, "swept expired entries");
        }
        count
    }

    // == Mutate ==
    /// Applies `f` to the current value and writes the result back through
    /// the normal `set` path, so the write is subject to the same eviction
    /// and TTL-refresh rules as any other. Absent or expired keys are a
    /// no-op returning None.
    pub fn mutate<F>(&mut self, key: &str, f: F) -> Option<Value>
    where
        F: FnOnce(Value) -> Value,
    {
        self.try_mutate(key, |current| Some(f(current.clone())))
    }

    /// Like `mutate`, but `f` may decline: returning None leaves the entry
    /// untouched. Used by the typed operators, which refuse to rewrite a
    /// value of the wrong shape.
    pub fn try_mutate<F>(&mut self, key: &str, f: F) -> Option<Value>
    where
        F: FnOnce(&Value) -> Option<Value>,
    {
        let current = self.read_for_update(key)?;
        let next = f(&current)?;
        self.set(key.to_string(), next.clone());
        Some(next)
    }

    // == Upsert ==
    /// Calls `f` with the current live value (None when absent) and writes
    /// the result unconditionally.
    pub fn upsert_with<F>(&mut self, key: &str, f: F) -> Value
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        let current = self.read_for_update(key);
        let next = f(current);
        self.set(key.to_string(), next.clone());
        next
    }

    /// Reads a value for a read-modify-write cycle: lazy expiry applies, but
    /// access order is left alone since the subsequent write refreshes it.
    fn read_for_update(&mut self, key: &str) -> Option<Value> {
        if self.expire_if_needed(key) {
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    // == Introspection ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current estimated size of the store in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Keys in queue order: insertion order under FIFO, recency order
    /// (victim first) under LRU.
    pub fn keys(&self) -> Vec<String> {
        self.queue.iter().cloned().collect()
    }

    /// Values in the same order as `keys`.
    pub fn values(&self) -> Vec<Value> {
        self.queue
            .iter()
            .filter_map(|k| self.entries.get(k).map(|e| e.value.clone()))
            .collect()
    }

    /// Key-value pairs in the same order as `keys`.
    pub fn entries_snapshot(&self) -> Vec<(String, Value)> {
        self.queue
            .iter()
            .filter_map(|k| self.entries.get(k).map(|e| (k.clone(), e.value.clone())))
            .collect()
    }

    /// A uniformly random key, or None when empty.
    pub fn random_key(&self) -> Option<String> {
        self.entries.keys().choose(&mut rand::thread_rng()).cloned()
    }

    // == Internal Helpers ==
    /// Removes `key` if its entry has expired. Returns true when a removal
    /// happened.
    fn expire_if_needed(&mut self, key: &str) -> bool {
        let expired = self
            .entries
            .get(key)
            .map(|e| e.is_expired())
            .unwrap_or(false);
        if expired {
            debug!(key = %key, "lazily removing expired entry");
            self.remove_entry(key);
        }
        expired
    }

    /// Removes an entry and keeps the queue and byte accounting in sync.
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.queue.remove(key);
        self.total_bytes = self
            .total_bytes
            .saturating_sub(size::entry_cost(key, &entry.value));
        Some(entry)
    }
}
