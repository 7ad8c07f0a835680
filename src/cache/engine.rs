//! Cache Engine Module
//!
//! The public cache handle. Wraps the synchronous `CacheCore` behind an
//! `Arc<RwLock<_>>`, wires up the event notifier and the alarm registry, and
//! manages the instance lifecycle: registration at construction, an optional
//! background TTL sweep, and explicit teardown via `destroy`.
//!
//! Events fire after the store lock is released, so a slow listener never
//! extends the critical section.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::alarm::AlarmRegistry;
use crate::cache::merge::{add_to_number, merge_values};
use crate::cache::{CacheCore, EntryView};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::events::{CacheEvent, CacheOp, EventBus, ListenerId};
use crate::tasks::spawn_sweep_task;

// == Cache ==
/// A bounded in-memory key/value cache instance.
///
/// Construction registers the instance with an alarm registry and, when a
/// TTL is configured, starts the periodic expiry sweep (which requires a
/// running tokio runtime). Reads on absent or expired keys return `None`;
/// no ordinary operation fails.
pub struct Cache {
    /// Shared engine; the sweep task and alarm registry hold weak handles
    core: Arc<RwLock<CacheCore>>,
    /// Listener table for operation events
    events: EventBus,
    /// The registry this instance reported itself to
    registry: Arc<AlarmRegistry>,
    /// Registration id, released on destroy
    registry_id: u64,
    /// Background sweep handle, present only when a TTL is configured
    sweep: Mutex<Option<JoinHandle<()>>>,
    /// Set once destroy has run
    destroyed: AtomicBool,
    /// Instance default for duplicate retention in sequence merges
    merge_allow_duplicates: bool,
}

impl Cache {
    // == Constructors ==
    /// Creates a cache registered with the process-wide alarm registry.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_registry(config, AlarmRegistry::global())
    }

    /// Creates a cache registered with the given registry. Tests use this to
    /// keep alarm bookkeeping isolated.
    pub fn with_registry(config: CacheConfig, registry: Arc<AlarmRegistry>) -> Result<Self> {
        config.validate()?;

        let merge_allow_duplicates = config.merge_allow_duplicates;
        let hooks = config.alarm.clone();
        let sweep_interval = config
            .ttl_millis
            .map(|_| Duration::from_millis(config.cleanup_interval_millis));

        let core = Arc::new(RwLock::new(CacheCore::new(config)));
        let registry_id = registry.register(&core, hooks);
        let sweep = sweep_interval.map(|interval| spawn_sweep_task(Arc::downgrade(&core), interval));

        Ok(Self {
            core,
            events: EventBus::new(),
            registry,
            registry_id,
            sweep: Mutex::new(sweep),
            destroyed: AtomicBool::new(false),
            merge_allow_duplicates,
        })
    }

    // == Writes ==
    /// Stores a key-value pair, evicting under capacity pressure.
    pub async fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.core.write().await.set(key.clone(), value.clone());
        self.events.emit(&key, &value, CacheOp::Set);
    }

    /// Applies `set` to each pair in order under a single lock; later pairs
    /// can evict earlier ones within the same call.
    pub async fn set_many(&self, pairs: Vec<(String, Value)>) {
        if pairs.is_empty() {
            return;
        }
        {
            let mut core = self.core.write().await;
            for (key, value) in &pairs {
                core.set(key.clone(), value.clone());
            }
        }
        let (keys, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        self.events.emit_bulk(&keys, &values, CacheOp::Set);
    }

    // == Reads ==
    /// Retrieves a value. Expired entries are swept as a side effect; under
    /// LRU the access is recorded; with `auto_delete_after_use` the entry is
    /// consumed.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let value = self.core.write().await.get(key);
        if let Some(value) = &value {
            self.events.emit(key, value, CacheOp::Get);
        }
        value
    }

    /// Retrieves several values, preserving request order.
    pub async fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> Vec<Option<Value>> {
        let mut results = Vec::with_capacity(keys.len());
        let mut hit_keys = Vec::new();
        let mut hit_values = Vec::new();
        {
            let mut core = self.core.write().await;
            for key in keys {
                let value = core.get(key.as_ref());
                if let Some(value) = &value {
                    hit_keys.push(key.as_ref().to_string());
                    hit_values.push(value.clone());
                }
                results.push(value);
            }
        }
        if !hit_keys.is_empty() {
            self.events.emit_bulk(&hit_keys, &hit_values, CacheOp::Get);
        }
        results
    }

    /// Checks for a live entry; a non-peek read for LRU purposes.
    pub async fn has(&self, key: &str) -> bool {
        self.core.write().await.has(key)
    }

    /// Returns an entry snapshot with derived age and remaining-TTL fields.
    pub async fn get_entry(&self, key: &str) -> Option<EntryView> {
        self.core.write().await.get_entry(key)
    }

    /// Reads a value with no side effects at all: no expiry sweep, no access
    /// recording, no auto-delete.
    pub async fn peek(&self, key: &str) -> Option<Value> {
        self.core.read().await.peek(key)
    }

    // == Removal ==
    /// Removes an entry. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> bool {
        let removed = self.core.write().await.delete(key);
        match removed {
            Some(value) => {
                self.events.emit(key, &value, CacheOp::Delete);
                true
            }
            None => false,
        }
    }

    /// Removes several entries, returning how many existed.
    pub async fn delete_many<K: AsRef<str>>(&self, keys: &[K]) -> usize {
        let mut hit_keys = Vec::new();
        let mut hit_values = Vec::new();
        {
            let mut core = self.core.write().await;
            for key in keys {
                if let Some(value) = core.delete(key.as_ref()) {
                    hit_keys.push(key.as_ref().to_string());
                    hit_values.push(value);
                }
            }
        }
        let count = hit_keys.len();
        if count > 0 {
            self.events.emit_bulk(&hit_keys, &hit_values, CacheOp::Delete);
        }
        count
    }

    /// Removes everything unconditionally.
    ///
    /// Deliberately exempt from per-key delete events: wildcard-key
    /// listeners observe a single keyless clear.
    pub async fn clear(&self) {
        let removed = self.core.write().await.clear();
        debug!(removed, "cache cleared");
        self.events.emit_keyless(CacheOp::Clear);
    }

    // == Mutation Operators ==
    /// Applies `f` to the current value and writes the result back through
    /// the normal write path. Absent or expired keys are a no-op returning
    /// None.
    pub async fn mutate<F>(&self, key: &str, f: F) -> Option<Value>
    where
        F: FnOnce(Value) -> Value,
    {
        let result = self.core.write().await.mutate(key, f);
        if let Some(value) = &result {
            self.events.emit(key, value, CacheOp::Mutate);
        }
        result
    }

    /// Writes `value` unconditionally and returns it.
    pub async fn upsert(&self, key: impl Into<String>, value: Value) -> Value {
        let key = key.into();
        self.core.write().await.set(key.clone(), value.clone());
        self.events.emit(&key, &value, CacheOp::Upsert);
        value
    }

    /// Calls `f` with the current value (None when absent) and writes the
    /// result unconditionally.
    pub async fn upsert_with<F>(&self, key: &str, f: F) -> Value
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        let value = self.core.write().await.upsert_with(key, f);
        self.events.emit(key, &value, CacheOp::Upsert);
        value
    }

    /// Adds `amount` to a numeric value. Missing keys and non-numeric values
    /// are a no-op returning None; an entry is never created.
    pub async fn increment(&self, key: &str, amount: f64) -> Option<Value> {
        let result = self.core.write().await.try_mutate(key, |current| {
            match current {
                Value::Number(n) => add_to_number(n, amount).map(Value::Number),
                _ => None,
            }
        });
        if let Some(value) = &result {
            self.events.emit(key, value, CacheOp::Increment);
        }
        result
    }

    /// Subtracts `amount` from a numeric value; the mirror of `increment`.
    pub async fn decrement(&self, key: &str, amount: f64) -> Option<Value> {
        let result = self.core.write().await.try_mutate(key, |current| {
            match current {
                Value::Number(n) => add_to_number(n, -amount).map(Value::Number),
                _ => None,
            }
        });
        if let Some(value) = &result {
            self.events.emit(key, value, CacheOp::Decrement);
        }
        result
    }

    /// Appends `items` to a sequence value. Missing keys and non-sequence
    /// values are a no-op returning None.
    pub async fn append(&self, key: &str, items: Vec<Value>) -> Option<Value> {
        let result = self.core.write().await.try_mutate(key, |current| {
            match current {
                Value::Array(existing) => {
                    let mut combined = existing.clone();
                    combined.extend(items);
                    Some(Value::Array(combined))
                }
                _ => None,
            }
        });
        if let Some(value) = &result {
            self.events.emit(key, value, CacheOp::Append);
        }
        result
    }

    /// Shallowly combines the current value with `updates`, dispatching on
    /// the current value's shape (see the merge module). `allow_duplicates`
    /// overrides the instance default when given. Returns None when the key
    /// does not exist.
    pub async fn merge(
        &self,
        key: &str,
        updates: Value,
        allow_duplicates: Option<bool>,
    ) -> Option<Value> {
        let allow = allow_duplicates.unwrap_or(self.merge_allow_duplicates);
        let result = self
            .core
            .write()
            .await
            .mutate(key, |current| merge_values(&current, &updates, allow));
        if let Some(value) = &result {
            self.events.emit(key, value, CacheOp::Merge);
        }
        result
    }

    // == Introspection ==
    /// Current number of entries.
    pub async fn size(&self) -> usize {
        self.core.read().await.len()
    }

    /// Estimated size of the store in bytes (approximate, see the size
    /// module).
    pub async fn size_in_bytes(&self) -> u64 {
        self.core.read().await.size_in_bytes()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.core.read().await.is_empty()
    }

    /// Keys in insertion order (FIFO) or recency order (LRU).
    pub async fn keys(&self) -> Vec<String> {
        self.core.read().await.keys()
    }

    /// Values in the same order as `keys`.
    pub async fn values(&self) -> Vec<Value> {
        self.core.read().await.values()
    }

    /// Key-value pairs in the same order as `keys`.
    pub async fn entries(&self) -> Vec<(String, Value)> {
        self.core.read().await.entries_snapshot()
    }

    /// A uniformly random key, or None when empty.
    pub async fn random_key(&self) -> Option<String> {
        self.core.read().await.random_key()
    }

    // == Expiry ==
    /// Sweeps every expired entry now, returning the count removed.
    pub async fn cleanup_expired(&self) -> usize {
        self.core.write().await.cleanup_expired()
    }

    /// Stops the background sweep. Safe to call when none is running.
    pub fn stop_cleanup(&self) {
        if let Some(handle) = self.sweep.lock().expect("sweep lock poisoned").take() {
            handle.abort();
            debug!("TTL sweep task stopped");
        }
    }

    // == Events ==
    /// Registers a listener scoped to an optional key and operation
    /// (None = wildcard). Returns an id for `off`.
    pub fn on<F>(&self, key: Option<&str>, op: Option<CacheOp>, handler: F) -> ListenerId
    where
        F: Fn(&CacheEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.on(key, op, handler)
    }

    /// Deregisters a listener. Returns false for unknown ids.
    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    // == Teardown ==
    /// Tears the instance down: stops the sweep, clears all entries and
    /// listeners, and unregisters from the alarm registry. Idempotent.
    /// Later writes still work but never restart a sweep or re-register.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_cleanup();
        self.core.write().await.clear();
        self.events.clear();
        self.registry.unregister(self.registry_id);
        debug!("cache instance destroyed");
    }

    /// Whether `destroy` has run.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("registry_id", &self.registry_id)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
