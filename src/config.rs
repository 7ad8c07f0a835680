//! Configuration Module
//!
//! Construction options for a cache instance. A `CacheConfig` is built once
//! and stays immutable for the instance's lifetime.

use std::fmt;
use std::sync::Arc;

use crate::alarm::AlarmReport;
use crate::cache::EvictionPolicy;
use crate::error::{CacheError, Result};

/// Default interval between background expiry sweeps, in milliseconds.
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 60_000;

// == Alarm Hooks ==
/// Callback invoked when a memory-alarm tier is crossed.
pub type AlarmHook = Arc<dyn Fn(&AlarmReport) + Send + Sync>;

/// Optional per-instance callbacks for the alarm registry.
///
/// When a hook is absent for a crossed tier, the registry emits its standard
/// diagnostic message instead.
#[derive(Clone, Default)]
pub struct AlarmHooks {
    /// Invoked when the warning threshold is crossed
    pub on_warning: Option<AlarmHook>,
    /// Invoked when the critical threshold is crossed
    pub on_critical: Option<AlarmHook>,
}

impl fmt::Debug for AlarmHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlarmHooks")
            .field("on_warning", &self.on_warning.is_some())
            .field("on_critical", &self.on_critical.is_some())
            .finish()
    }
}

// == Cache Config ==
/// Cache instance configuration.
///
/// All limits are optional: a default cache is unbounded and never expires
/// entries. When both `max_bytes` and `max_entries` are supplied, the byte
/// budget takes precedence and the count bound is ignored.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries (None = unbounded)
    pub max_entries: Option<usize>,
    /// Maximum aggregate estimated size in bytes; dominates `max_entries`
    pub max_bytes: Option<u64>,
    /// Time-to-live applied to every write (None = entries never expire)
    pub ttl_millis: Option<u64>,
    /// Interval between background expiry sweeps; only active when a TTL is set
    pub cleanup_interval_millis: u64,
    /// Victim selection discipline under capacity pressure
    pub eviction_policy: EvictionPolicy,
    /// Remove an entry once its value has been read
    pub auto_delete_after_use: bool,
    /// Instance-level default for duplicate retention in sequence merges
    pub merge_allow_duplicates: bool,
    /// Per-instance memory-alarm callbacks
    pub alarm: AlarmHooks,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: None,
            max_bytes: None,
            ttl_millis: None,
            cleanup_interval_millis: DEFAULT_CLEANUP_INTERVAL_MS,
            eviction_policy: EvictionPolicy::Fifo,
            auto_delete_after_use: false,
            merge_allow_duplicates: false,
            alarm: AlarmHooks::default(),
        }
    }
}

impl CacheConfig {
    /// Creates a new builder for cache configuration.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// Zero-valued limits are rejected: a zero capacity, byte budget, TTL, or
    /// sweep interval is always a caller mistake rather than a meaningful
    /// request.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == Some(0) {
            return Err(CacheError::InvalidConfig(
                "max_entries must be greater than 0".to_string(),
            ));
        }
        if self.max_bytes == Some(0) {
            return Err(CacheError::InvalidConfig(
                "max_bytes must be greater than 0".to_string(),
            ));
        }
        if self.ttl_millis == Some(0) {
            return Err(CacheError::InvalidConfig(
                "ttl_millis must be greater than 0".to_string(),
            ));
        }
        if self.cleanup_interval_millis == 0 {
            return Err(CacheError::InvalidConfig(
                "cleanup_interval_millis must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// == Builder ==
/// Builder for cache configuration.
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    max_entries: Option<usize>,
    max_bytes: Option<u64>,
    ttl_millis: Option<u64>,
    cleanup_interval_millis: Option<u64>,
    eviction_policy: Option<EvictionPolicy>,
    auto_delete_after_use: Option<bool>,
    merge_allow_duplicates: Option<bool>,
    alarm: AlarmHooks,
}

impl CacheConfigBuilder {
    /// Sets the maximum number of entries.
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Sets the aggregate byte budget. Takes precedence over `max_entries`.
    pub fn max_bytes(mut self, budget: u64) -> Self {
        self.max_bytes = Some(budget);
        self
    }

    /// Sets the TTL applied to every write, in milliseconds.
    pub fn ttl_millis(mut self, ttl: u64) -> Self {
        self.ttl_millis = Some(ttl);
        self
    }

    /// Sets the background sweep interval, in milliseconds.
    pub fn cleanup_interval_millis(mut self, interval: u64) -> Self {
        self.cleanup_interval_millis = Some(interval);
        self
    }

    /// Sets the eviction policy.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Removes entries once their value has been read.
    pub fn auto_delete_after_use(mut self, enable: bool) -> Self {
        self.auto_delete_after_use = Some(enable);
        self
    }

    /// Keeps duplicate elements when merging sequences.
    pub fn merge_allow_duplicates(mut self, allow: bool) -> Self {
        self.merge_allow_duplicates = Some(allow);
        self
    }

    /// Sets the warning-tier alarm callback.
    pub fn on_warning<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AlarmReport) + Send + Sync + 'static,
    {
        self.alarm.on_warning = Some(Arc::new(hook));
        self
    }

    /// Sets the critical-tier alarm callback.
    pub fn on_critical<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AlarmReport) + Send + Sync + 'static,
    {
        self.alarm.on_critical = Some(Arc::new(hook));
        self
    }

    /// Builds the cache configuration.
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            ttl_millis: self.ttl_millis,
            cleanup_interval_millis: self
                .cleanup_interval_millis
                .unwrap_or(defaults.cleanup_interval_millis),
            eviction_policy: self.eviction_policy.unwrap_or(defaults.eviction_policy),
            auto_delete_after_use: self
                .auto_delete_after_use
                .unwrap_or(defaults.auto_delete_after_use),
            merge_allow_duplicates: self
                .merge_allow_duplicates
                .unwrap_or(defaults.merge_allow_duplicates),
            alarm: self.alarm,
        }
    }
}
