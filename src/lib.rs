//! memvault - An embedded in-memory key/value cache
//!
//! Provides a bounded cache with TTL expiration, FIFO/LRU eviction, typed
//! in-place mutation operators, scoped operation events, and a process-wide
//! registry that raises alarms on estimated memory pressure.

pub mod alarm;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod tasks;

pub use alarm::{
    AlarmRegistry, AlarmReport, AlarmSummary, AlarmTier, ALARM_CRITICAL_BYTES,
    ALARM_SAFE_CEILING_BYTES, ALARM_WARNING_BYTES,
};
pub use cache::{Cache, CacheEntry, EntryView, EvictionPolicy};
pub use config::{AlarmHook, AlarmHooks, CacheConfig, CacheConfigBuilder};
pub use error::{CacheError, Result};
pub use events::{CacheEvent, CacheOp, ListenerId};
