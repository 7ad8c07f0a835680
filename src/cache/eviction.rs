//! Eviction Policy Module
//!
//! Tracks candidate order for victim selection under capacity pressure.
//!
//! One queue serves both disciplines; the policy decides what reorders it.
//! The front of the queue is always the next victim:
//! - FIFO: new keys join at the back, overwrites keep their slot, and reads
//!   never reorder, so the front is the first-inserted key.
//! - LRU: writes and (non-peek) reads move a key to the back, so the front is
//!   the least recently used key. A key never read competes by its insertion
//!   slot, which matches competing by creation time.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

// == Eviction Policy ==
/// Victim selection discipline used when a capacity bound is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the first-inserted entry
    #[default]
    Fifo,
    /// Evict the least recently used entry
    Lru,
}

// == Eviction Queue ==
/// Candidate ordering for eviction.
///
/// Front = next victim, back = most recently inserted/used.
#[derive(Debug, Default)]
pub struct EvictionQueue {
    order: VecDeque<String>,
}

impl EvictionQueue {
    // == Constructor ==
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Record Insert ==
    /// Registers a newly inserted key at the back of the queue.
    ///
    /// Overwrites must not call this; an overwritten key keeps its slot under
    /// FIFO and is re-ordered via `touch` under LRU.
    pub fn record_insert(&mut self, key: &str) {
        self.order.push_back(key.to_string());
    }

    // == Touch ==
    /// Marks a key as just used, moving it to the back.
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        self.order.push_back(key.to_string());
    }

    // == Remove ==
    /// Removes a key from the queue.
    pub fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    // == Victim Selection ==
    /// Returns the next victim, skipping `exclude` when given.
    ///
    /// The key currently being written is never a victim on its own write, so
    /// the scan starts at the front and steps past the excluded key.
    pub fn victim_excluding(&self, exclude: Option<&str>) -> Option<&String> {
        self.order
            .iter()
            .find(|k| Some(k.as_str()) != exclude)
    }

    // == Clear ==
    /// Drops every tracked key.
    pub fn clear(&mut self) {
        self.order.clear();
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // == Iteration ==
    /// Keys in queue order (victim first).
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    // == Contains ==
    /// Checks if a key is being tracked.
    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_new() {
        let queue = EvictionQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.victim_excluding(None), None);
    }

    #[test]
    fn test_fifo_victim_is_first_inserted() {
        let mut queue = EvictionQueue::new();

        queue.record_insert("key1");
        queue.record_insert("key2");
        queue.record_insert("key3");

        assert_eq!(queue.victim_excluding(None), Some(&"key1".to_string()));
    }

    #[test]
    fn test_touch_moves_key_to_back() {
        let mut queue = EvictionQueue::new();

        queue.record_insert("key1");
        queue.record_insert("key2");
        queue.record_insert("key3");

        // key1 is used, key2 becomes the victim
        queue.touch("key1");

        assert_eq!(queue.victim_excluding(None), Some(&"key2".to_string()));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_victim_excluding_skips_key_being_written() {
        let mut queue = EvictionQueue::new();

        queue.record_insert("key1");
        queue.record_insert("key2");

        assert_eq!(
            queue.victim_excluding(Some("key1")),
            Some(&"key2".to_string())
        );
    }

    #[test]
    fn test_victim_excluding_sole_key() {
        let mut queue = EvictionQueue::new();
        queue.record_insert("only");

        assert_eq!(queue.victim_excluding(Some("only")), None);
    }

    #[test]
    fn test_remove() {
        let mut queue = EvictionQueue::new();

        queue.record_insert("key1");
        queue.record_insert("key2");
        queue.record_insert("key3");

        queue.remove("key2");

        assert_eq!(queue.len(), 2);
        assert!(!queue.contains("key2"));
        assert!(queue.contains("key1"));
        assert!(queue.contains("key3"));
    }

    #[test]
    fn test_remove_nonexistent_key() {
        let mut queue = EvictionQueue::new();
        queue.record_insert("key1");

        queue.remove("nonexistent");

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_order_after_multiple_touches() {
        let mut queue = EvictionQueue::new();

        queue.record_insert("a");
        queue.record_insert("b");
        queue.record_insert("c");

        queue.touch("a");
        queue.touch("c");
        queue.touch("b");

        // Back-to-front after touches: b, c, a; so the victim is 'a'
        let order: Vec<&String> = queue.iter().collect();
        assert_eq!(order, [&"a".to_string(), &"c".to_string(), &"b".to_string()]);
        assert_eq!(queue.victim_excluding(None), Some(&"a".to_string()));
    }

    #[test]
    fn test_clear() {
        let mut queue = EvictionQueue::new();
        queue.record_insert("key1");
        queue.record_insert("key2");

        queue.clear();

        assert!(queue.is_empty());
    }

    #[test]
    fn test_policy_default_is_fifo() {
        assert_eq!(EvictionPolicy::default(), EvictionPolicy::Fifo);
    }
}
