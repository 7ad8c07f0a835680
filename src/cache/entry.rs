//! Cache Entry Module
//!
//! Defines the structure for individual cache entries and their metadata.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

// == Cache Entry ==
/// A single stored value plus its lifecycle metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: Value,
    /// Creation timestamp (Unix milliseconds); preserved across overwrites
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Last access timestamp; only maintained under the LRU policy
    pub last_accessed: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry with optional TTL.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl_millis` - Optional TTL in milliseconds
    pub fn new(value: Value, ttl_millis: Option<u64>) -> Self {
        let now = current_timestamp_ms();
        let expires_at = ttl_millis.map(|ttl| now + ttl);

        Self {
            value,
            created_at: now,
            expires_at,
            last_accessed: None,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry expires strictly after its deadline: it is still alive at the
    /// exact `expires_at` instant and absent one millisecond later.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() > expires,
            None => false,
        }
    }

    // == Touch ==
    /// Records an access at the current instant.
    pub fn touch(&mut self) {
        self.last_accessed = Some(current_timestamp_ms());
    }

    // == Effective Access Time ==
    /// The timestamp an LRU victim scan compares: the last access if the
    /// entry was ever read, otherwise its creation time.
    pub fn effective_access_time(&self) -> u64 {
        self.last_accessed.unwrap_or(self.created_at)
    }

    // == Age ==
    /// Milliseconds elapsed since the entry was first created.
    pub fn age_ms(&self) -> u64 {
        current_timestamp_ms().saturating_sub(self.created_at)
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// Returns `Some(0)` once the deadline has passed.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }
}

// == Entry View ==
/// Serializable snapshot of an entry returned by `get_entry`.
///
/// Carries the raw metadata plus the derived `age_ms` / `ttl_left_ms` fields,
/// computed at the moment of the read.
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    /// The key the entry is stored under
    pub key: String,
    /// The stored value
    pub value: Value,
    /// When the entry was first created
    pub created_at: DateTime<Utc>,
    /// When the entry expires, if a TTL is configured
    pub expires_at: Option<DateTime<Utc>>,
    /// Last recorded access, if the LRU policy ever touched it
    pub last_accessed: Option<DateTime<Utc>>,
    /// Milliseconds since creation
    pub age_ms: u64,
    /// Milliseconds until expiry, absent without a TTL
    pub ttl_left_ms: Option<u64>,
}

impl EntryView {
    /// Builds a view of `entry` as stored under `key`.
    pub fn from_entry(key: &str, entry: &CacheEntry) -> Self {
        Self {
            key: key.to_string(),
            value: entry.value.clone(),
            created_at: millis_to_datetime(entry.created_at),
            expires_at: entry.expires_at.map(millis_to_datetime),
            last_accessed: entry.last_accessed.map(millis_to_datetime),
            age_ms: entry.age_ms(),
            ttl_left_ms: entry.ttl_remaining_ms(),
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

fn millis_to_datetime(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_else(Utc::now)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new(json!("test_value"), None);

        assert_eq!(entry.value, json!("test_value"));
        assert!(entry.expires_at.is_none());
        assert!(entry.last_accessed.is_none());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new(json!(42), Some(60_000));

        assert_eq!(entry.expires_at, Some(entry.created_at + 60_000));
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new(json!("v"), Some(50));

        assert!(!entry.is_expired());
        sleep(Duration::from_millis(80));
        assert!(entry.is_expired());
    }

    #[test]
    fn test_expiration_is_strict() {
        // An entry whose deadline lies in the future by a wide margin is
        // alive; one whose deadline has passed is not.
        let now = current_timestamp_ms();
        let alive = CacheEntry {
            value: json!(1),
            created_at: now,
            expires_at: Some(now + 60_000),
            last_accessed: None,
        };
        let dead = CacheEntry {
            value: json!(1),
            created_at: now - 100,
            expires_at: Some(now - 1),
            last_accessed: None,
        };

        assert!(!alive.is_expired());
        assert!(dead.is_expired());
    }

    #[test]
    fn test_touch_updates_effective_access() {
        let mut entry = CacheEntry::new(json!("v"), None);
        assert_eq!(entry.effective_access_time(), entry.created_at);

        sleep(Duration::from_millis(5));
        entry.touch();

        assert!(entry.last_accessed.is_some());
        assert!(entry.effective_access_time() >= entry.created_at);
    }

    #[test]
    fn test_ttl_remaining_ms() {
        let entry = CacheEntry::new(json!("v"), Some(10_000));

        let remaining = entry.ttl_remaining_ms().unwrap();
        assert!(remaining <= 10_000);
        assert!(remaining >= 9_000);
    }

    #[test]
    fn test_ttl_remaining_no_expiration() {
        let entry = CacheEntry::new(json!("v"), None);
        assert!(entry.ttl_remaining_ms().is_none());
    }

    #[test]
    fn test_ttl_remaining_expired_is_zero() {
        let entry = CacheEntry::new(json!("v"), Some(30));
        sleep(Duration::from_millis(60));
        assert_eq!(entry.ttl_remaining_ms().unwrap(), 0);
    }

    #[test]
    fn test_entry_view_derived_fields() {
        let entry = CacheEntry::new(json!({"a": 1}), Some(5_000));
        sleep(Duration::from_millis(15));

        let view = EntryView::from_entry("some_key", &entry);
        assert_eq!(view.key, "some_key");
        assert_eq!(view.value, json!({"a": 1}));
        assert!(view.age_ms >= 15);
        assert!(view.ttl_left_ms.unwrap() < 5_000);
        assert!(view.expires_at.is_some());
        assert!(view.last_accessed.is_none());
    }
}
