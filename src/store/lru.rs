//! LRU Tracker Module
//!
//! Access-order tracking for keyspace eviction.

use std::collections::VecDeque;

// == LRU Tracker ==
/// Tracks access order for LRU eviction.
///
/// Front = most recently used, back = least recently used.
#[derive(Debug, Default)]
pub struct LruTracker {
    order: VecDeque<String>,
}

impl LruTracker {
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Touch ==
    /// Marks a key as most recently used.
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        self.order.push_front(key.to_string());
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    // == Evict ==
    /// Removes and returns the least recently used key that `evictable`
    /// accepts. Keys it rejects keep their position.
    pub fn evict_oldest_where<F>(&mut self, evictable: F) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        let idx = self.order.iter().rposition(|k| evictable(k))?;
        self.order.remove(idx)
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
