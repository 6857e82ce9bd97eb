//! Store Statistics Module
//!
//! Tracks keyspace read hits, misses, evictions and expirations.

use serde::Serialize;

// == Store Stats ==
/// Keyspace performance counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Reads that found a live key
    pub hits: u64,
    /// Reads that found nothing or an expired key
    pub misses: u64,
    /// Keys removed by the LRU policy
    pub evictions: u64,
    /// Keys removed because their TTL elapsed
    pub expirations: u64,
    /// Current number of keys
    pub total_entries: usize,
}

impl StoreStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// hits / (hits + misses), or 0.0 before any read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
