//! Memory Alarm Registry
//!
//! Process-wide bookkeeping of live cache instances and their estimated
//! memory footprint. Instances register at construction and unregister at
//! teardown; the registry holds only weak references, so it never keeps a
//! cache alive.
//!
//! A single shared monitor task (at most one per registry, regardless of the
//! number of caches) periodically probes every live instance and classifies
//! its estimated size against two fixed tiers. A crossed tier invokes the
//! instance's custom callback when one was supplied, and otherwise emits a
//! standard diagnostic through `tracing`.
//!
//! Most programs use the lazily-initialized process-wide handle from
//! [`AlarmRegistry::global`]; tests construct isolated registries.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cache::CacheCore;
use crate::config::AlarmHooks;

// == Thresholds ==
/// Estimated bytes at which an instance enters the warning tier (1 GiB).
pub const ALARM_WARNING_BYTES: u64 = 1024 * 1024 * 1024;

/// Estimated bytes at which an instance enters the critical tier (1.5 GiB).
pub const ALARM_CRITICAL_BYTES: u64 = ALARM_WARNING_BYTES + ALARM_WARNING_BYTES / 2;

/// Documented safe ceiling (~1.6 GiB). Used only to phrase the remaining
/// headroom in the default diagnostic message, never for classification.
pub const ALARM_SAFE_CEILING_BYTES: u64 = 1_717_986_918;

// == Alarm Tier ==
/// Severity classification of an instance's estimated size. Critical takes
/// precedence: a size past both thresholds reports only critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmTier {
    Warning,
    Critical,
}

impl fmt::Display for AlarmTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmTier::Warning => f.write_str("warning"),
            AlarmTier::Critical => f.write_str("critical"),
        }
    }
}

/// Classifies an estimated size against the fixed thresholds.
pub fn classify(bytes: u64) -> Option<AlarmTier> {
    if bytes >= ALARM_CRITICAL_BYTES {
        Some(AlarmTier::Critical)
    } else if bytes >= ALARM_WARNING_BYTES {
        Some(AlarmTier::Warning)
    } else {
        None
    }
}

// == Alarm Report ==
/// Details handed to an alarm callback when a tier is crossed.
#[derive(Debug, Clone)]
pub struct AlarmReport {
    /// The crossed tier
    pub tier: AlarmTier,
    /// Registry id of the instance that crossed it
    pub instance_id: u64,
    /// The instance's estimated size
    pub instance_bytes: u64,
    /// Aggregate estimated size across all live instances at probe time
    pub total_bytes: u64,
}

impl AlarmReport {
    /// Bytes remaining below the documented safe ceiling.
    pub fn headroom_bytes(&self) -> u64 {
        ALARM_SAFE_CEILING_BYTES.saturating_sub(self.instance_bytes)
    }
}

// == Check Summary ==
/// Aggregate result of one monitoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmSummary {
    /// Sum of every live instance's estimated size
    pub total_bytes: u64,
    /// Instances still alive at probe time
    pub live_instances: usize,
    /// Instances that crossed the warning tier
    pub warnings: usize,
    /// Instances that crossed the critical tier
    pub criticals: usize,
}

// == Registry ==
struct Registered {
    core: Weak<RwLock<CacheCore>>,
    hooks: AlarmHooks,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    instances: HashMap<u64, Registered>,
}

/// The instance registry and its shared monitor task.
#[derive(Default)]
pub struct AlarmRegistry {
    inner: Mutex<RegistryInner>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

static GLOBAL: OnceLock<Arc<AlarmRegistry>> = OnceLock::new();

impl AlarmRegistry {
    /// Creates an isolated registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry handle, initialized on first use.
    pub fn global() -> Arc<AlarmRegistry> {
        GLOBAL.get_or_init(|| Arc::new(AlarmRegistry::new())).clone()
    }

    // == Registration ==
    /// Registers a cache instance and returns its registry id.
    ///
    /// Only a weak reference is kept; the registry never extends the
    /// instance's lifetime.
    pub fn register(&self, core: &Arc<RwLock<CacheCore>>, hooks: AlarmHooks) -> u64 {
        let mut inner = self.inner.lock().expect("alarm registry lock poisoned");
        inner.next_id += 1;
        let id = inner.next_id;
        inner.instances.insert(
            id,
            Registered {
                core: Arc::downgrade(core),
                hooks,
            },
        );
        id
    }

    /// Removes an instance from the registry. Safe to call twice.
    pub fn unregister(&self, id: u64) -> bool {
        self.inner
            .lock()
            .expect("alarm registry lock poisoned")
            .instances
            .remove(&id)
            .is_some()
    }

    /// Number of registered instances (live or not yet pruned).
    pub fn instance_count(&self) -> usize {
        self.inner
            .lock()
            .expect("alarm registry lock poisoned")
            .instances
            .len()
    }

    // == Probe ==
    /// Probes every registered instance, raises alarms for crossed tiers,
    /// prunes instances that were dropped without explicit teardown, and
    /// returns the aggregate picture.
    pub async fn check_all(&self) -> AlarmSummary {
        // Snapshot under the lock; probing takes each instance's own lock
        let snapshot: Vec<(u64, Weak<RwLock<CacheCore>>, AlarmHooks)> = {
            let inner = self.inner.lock().expect("alarm registry lock poisoned");
            inner
                .instances
                .iter()
                .map(|(id, reg)| (*id, reg.core.clone(), reg.hooks.clone()))
                .collect()
        };

        let mut probes = Vec::new();
        let mut dead = Vec::new();
        for (id, weak, hooks) in snapshot {
            match weak.upgrade() {
                Some(core) => {
                    let bytes = core.read().await.size_in_bytes();
                    probes.push((id, bytes, hooks));
                }
                None => dead.push(id),
            }
        }

        let total_bytes: u64 = probes.iter().map(|(_, bytes, _)| bytes).sum();
        let mut summary = AlarmSummary {
            total_bytes,
            live_instances: probes.len(),
            warnings: 0,
            criticals: 0,
        };

        for (id, bytes, hooks) in &probes {
            if let Some(tier) = classify(*bytes) {
                match tier {
                    AlarmTier::Warning => summary.warnings += 1,
                    AlarmTier::Critical => summary.criticals += 1,
                }
                let report = AlarmReport {
                    tier,
                    instance_id: *id,
                    instance_bytes: *bytes,
                    total_bytes,
                };
                raise(&report, hooks);
            }
        }

        if !dead.is_empty() {
            let mut inner = self.inner.lock().expect("alarm registry lock poisoned");
            for id in dead {
                inner.instances.remove(&id);
            }
        }

        summary
    }

    // == Monitoring ==
    /// Starts the shared periodic probe. Starting while already running
    /// restarts it with the new interval.
    pub fn start_monitoring(self: &Arc<Self>, interval: Duration) {
        let mut guard = self.monitor.lock().expect("alarm monitor lock poisoned");
        if let Some(handle) = guard.take() {
            handle.abort();
        }

        info!(
            "Starting memory alarm monitor with interval of {:?}",
            interval
        );

        // The task holds only a weak handle so a dropped registry stops its
        // own monitor
        let registry = Arc::downgrade(self);
        *guard = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match registry.upgrade() {
                    Some(registry) => {
                        registry.check_all().await;
                    }
                    None => break,
                }
            }
        }));
    }

    /// Stops the shared probe. Safe to call when nothing is running.
    pub fn stop_monitoring(&self) {
        if let Some(handle) = self
            .monitor
            .lock()
            .expect("alarm monitor lock poisoned")
            .take()
        {
            handle.abort();
            info!("Memory alarm monitor stopped");
        }
    }

    /// Whether the shared probe is currently scheduled.
    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .expect("alarm monitor lock poisoned")
            .is_some()
    }
}

impl fmt::Debug for AlarmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlarmRegistry")
            .field("instances", &self.instance_count())
            .field("monitoring", &self.is_monitoring())
            .finish()
    }
}

/// Dispatches a crossed tier to the instance's custom callback, or emits the
/// standard diagnostic when none was supplied.
fn raise(report: &AlarmReport, hooks: &AlarmHooks) {
    let hook = match report.tier {
        AlarmTier::Warning => hooks.on_warning.as_ref(),
        AlarmTier::Critical => hooks.on_critical.as_ref(),
    };

    match hook {
        Some(hook) => hook(report),
        None => match report.tier {
            AlarmTier::Warning => warn!(
                "Cache instance {} estimated at {} bytes crossed the warning threshold; {} bytes of headroom remain below the safe ceiling",
                report.instance_id,
                report.instance_bytes,
                report.headroom_bytes()
            ),
            AlarmTier::Critical => error!(
                "Cache instance {} estimated at {} bytes crossed the critical threshold; {} bytes of headroom remain below the safe ceiling",
                report.instance_id,
                report.instance_bytes,
                report.headroom_bytes()
            ),
        },
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_core() -> Arc<RwLock<CacheCore>> {
        Arc::new(RwLock::new(CacheCore::new(CacheConfig::default())))
    }

    #[test]
    fn test_classify_tiers() {
        assert_eq!(classify(0), None);
        assert_eq!(classify(ALARM_WARNING_BYTES - 1), None);
        assert_eq!(classify(ALARM_WARNING_BYTES), Some(AlarmTier::Warning));
        assert_eq!(classify(ALARM_CRITICAL_BYTES - 1), Some(AlarmTier::Warning));
        // Critical takes precedence, warning is not reported alongside
        assert_eq!(classify(ALARM_CRITICAL_BYTES), Some(AlarmTier::Critical));
        assert_eq!(classify(u64::MAX), Some(AlarmTier::Critical));
    }

    #[test]
    fn test_threshold_constants() {
        assert_eq!(ALARM_WARNING_BYTES, 1_073_741_824);
        assert_eq!(ALARM_CRITICAL_BYTES, 1_610_612_736);
        assert!(ALARM_SAFE_CEILING_BYTES > ALARM_CRITICAL_BYTES);
    }

    #[test]
    fn test_raise_prefers_custom_hook() {
        let fired = Arc::new(AtomicUsize::new(0));
        let seen_tier = fired.clone();
        let hooks = AlarmHooks {
            on_warning: None,
            on_critical: Some(Arc::new(move |report| {
                assert_eq!(report.tier, AlarmTier::Critical);
                seen_tier.fetch_add(1, Ordering::SeqCst);
            })),
        };

        let report = AlarmReport {
            tier: AlarmTier::Critical,
            instance_id: 7,
            instance_bytes: ALARM_CRITICAL_BYTES,
            total_bytes: ALARM_CRITICAL_BYTES,
        };
        raise(&report, &hooks);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_report_headroom() {
        let report = AlarmReport {
            tier: AlarmTier::Warning,
            instance_id: 1,
            instance_bytes: ALARM_WARNING_BYTES,
            total_bytes: ALARM_WARNING_BYTES,
        };
        assert_eq!(
            report.headroom_bytes(),
            ALARM_SAFE_CEILING_BYTES - ALARM_WARNING_BYTES
        );

        let past_ceiling = AlarmReport {
            instance_bytes: ALARM_SAFE_CEILING_BYTES + 1,
            ..report
        };
        assert_eq!(past_ceiling.headroom_bytes(), 0);
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let registry = AlarmRegistry::new();
        let core = make_core();

        let id = registry.register(&core, AlarmHooks::default());
        assert_eq!(registry.instance_count(), 1);

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert_eq!(registry.instance_count(), 0);
    }

    #[tokio::test]
    async fn test_check_all_totals_live_instances() {
        let registry = AlarmRegistry::new();
        let core_a = make_core();
        let core_b = make_core();
        registry.register(&core_a, AlarmHooks::default());
        registry.register(&core_b, AlarmHooks::default());

        core_a.write().await.set("k".to_string(), json!("abcd"));
        core_b.write().await.set("k".to_string(), json!(1));

        let expected =
            core_a.read().await.size_in_bytes() + core_b.read().await.size_in_bytes();
        let summary = registry.check_all().await;

        assert_eq!(summary.live_instances, 2);
        assert_eq!(summary.total_bytes, expected);
        assert_eq!(summary.warnings, 0);
        assert_eq!(summary.criticals, 0);
    }

    #[tokio::test]
    async fn test_check_all_prunes_dropped_instances() {
        let registry = AlarmRegistry::new();
        let core = make_core();
        registry.register(&core, AlarmHooks::default());

        drop(core);
        assert_eq!(registry.instance_count(), 1);

        let summary = registry.check_all().await;
        assert_eq!(summary.live_instances, 0);
        assert_eq!(registry.instance_count(), 0);
    }

    #[tokio::test]
    async fn test_monitoring_restart_and_idempotent_stop() {
        let registry = Arc::new(AlarmRegistry::new());

        // Stopping with no monitor running is a no-op
        registry.stop_monitoring();
        assert!(!registry.is_monitoring());

        registry.start_monitoring(Duration::from_millis(50));
        assert!(registry.is_monitoring());

        // Starting again restarts with the new interval
        registry.start_monitoring(Duration::from_millis(10));
        assert!(registry.is_monitoring());

        registry.stop_monitoring();
        registry.stop_monitoring();
        assert!(!registry.is_monitoring());
    }

    #[tokio::test]
    async fn test_global_registry_is_shared() {
        let a = AlarmRegistry::global();
        let b = AlarmRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
