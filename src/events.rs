//! Event Notifier Module
//!
//! Synchronous, in-process fan-out of cache operation events to registered
//! listeners. Listeners are scoped by an optional key and an optional
//! operation kind; `None` in either position is a wildcard.
//!
//! For a single-key event, listeners fire in a fixed order: exact key and
//! exact operation, exact key with any operation, any key with exact
//! operation, then any key with any operation. Bulk operations fire once per
//! affected key toward key-scoped listeners, and once with the whole batch
//! toward wildcard-key listeners.
//!
//! A failing handler is reported to the diagnostic channel and never aborts
//! the cache operation or the remaining handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tracing::error;

// == Operation Kinds ==
/// The cache operations listeners can scope to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOp {
    Set,
    Get,
    Delete,
    Clear,
    Mutate,
    Upsert,
    Increment,
    Decrement,
    Append,
    Merge,
}

impl fmt::Display for CacheOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheOp::Set => "set",
            CacheOp::Get => "get",
            CacheOp::Delete => "delete",
            CacheOp::Clear => "clear",
            CacheOp::Mutate => "mutate",
            CacheOp::Upsert => "upsert",
            CacheOp::Increment => "increment",
            CacheOp::Decrement => "decrement",
            CacheOp::Append => "append",
            CacheOp::Merge => "merge",
        };
        f.write_str(name)
    }
}

// == Event Payload ==
/// What a listener receives: the affected key(s), the value(s) involved, and
/// the operation that completed. Single-key events carry one key and one
/// value; batch events carry the whole affected set.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEvent {
    pub keys: Vec<String>,
    pub values: Vec<Value>,
    pub op: CacheOp,
}

impl CacheEvent {
    /// Builds a single-key event.
    pub fn single(key: impl Into<String>, value: Value, op: CacheOp) -> Self {
        Self {
            keys: vec![key.into()],
            values: vec![value],
            op,
        }
    }

    /// Builds a batch event over every affected key.
    pub fn batch(keys: Vec<String>, values: Vec<Value>, op: CacheOp) -> Self {
        Self { keys, values, op }
    }
}

/// Identifier returned by `on`, used to deregister with `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&CacheEvent) -> anyhow::Result<()> + Send + Sync>;

// == Event Bus ==
/// The listener table: key scope → operation scope → handlers.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    table: HashMap<Option<String>, HashMap<Option<CacheOp>, Vec<(ListenerId, Handler)>>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    // == Subscribe ==
    /// Registers a handler for the given key/operation scope. `None` in
    /// either position matches everything.
    pub fn on<F>(&self, key: Option<&str>, op: Option<CacheOp>, handler: F) -> ListenerId
    where
        F: Fn(&CacheEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner
            .table
            .entry(key.map(str::to_string))
            .or_default()
            .entry(op)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    // == Unsubscribe ==
    /// Removes a handler by id. Returns false when the id is unknown.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        let mut found = false;
        for ops in inner.table.values_mut() {
            for handlers in ops.values_mut() {
                let before = handlers.len();
                handlers.retain(|(hid, _)| *hid != id);
                found |= handlers.len() != before;
            }
        }
        found
    }

    /// Drops every registered listener.
    pub fn clear(&self) {
        self.inner
            .lock()
            .expect("event bus lock poisoned")
            .table
            .clear();
    }

    /// Number of registered listeners, for tests and diagnostics.
    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .expect("event bus lock poisoned")
            .table
            .values()
            .flat_map(|ops| ops.values())
            .map(Vec::len)
            .sum()
    }

    // == Emit ==
    /// Fires a single-key event through all four scope combinations.
    pub fn emit(&self, key: &str, value: &Value, op: CacheOp) {
        let event = CacheEvent::single(key, value.clone(), op);
        let handlers = self.collect(Some(key), op, true);
        Self::run(&handlers, &event);
    }

    /// Fires a bulk operation: one event per affected key toward key-scoped
    /// listeners, then a single batch event toward wildcard-key listeners.
    pub fn emit_bulk(&self, keys: &[String], values: &[Value], op: CacheOp) {
        for (key, value) in keys.iter().zip(values) {
            let event = CacheEvent::single(key.clone(), value.clone(), op);
            let handlers = self.collect(Some(key), op, false);
            Self::run(&handlers, &event);
        }

        let event = CacheEvent::batch(keys.to_vec(), values.to_vec(), op);
        let handlers = self.collect(None, op, true);
        Self::run(&handlers, &event);
    }

    /// Fires a keyless event (only wildcard-key listeners can observe it).
    pub fn emit_keyless(&self, op: CacheOp) {
        let event = CacheEvent::batch(Vec::new(), Vec::new(), op);
        let handlers = self.collect(None, op, true);
        Self::run(&handlers, &event);
    }

    /// Snapshots the matching handlers in firing order. Handlers are cloned
    /// out so none run under the table lock.
    fn collect(&self, key: Option<&str>, op: CacheOp, include_wildcard_key: bool) -> Vec<Handler> {
        let inner = self.inner.lock().expect("event bus lock poisoned");
        let mut out = Vec::new();

        let mut push_scope = |key_scope: &Option<String>, op_scope: Option<CacheOp>| {
            if let Some(handlers) = inner
                .table
                .get(key_scope)
                .and_then(|ops| ops.get(&op_scope))
            {
                out.extend(handlers.iter().map(|(_, h)| Arc::clone(h)));
            }
        };

        if let Some(key) = key {
            let exact = Some(key.to_string());
            push_scope(&exact, Some(op));
            push_scope(&exact, None);
        }
        if include_wildcard_key || key.is_none() {
            push_scope(&None, Some(op));
            push_scope(&None, None);
        }
        out
    }

    fn run(handlers: &[Handler], event: &CacheEvent) {
        for handler in handlers {
            if let Err(err) = handler(event) {
                error!(op = %event.op, error = %err, "cache event handler failed");
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
