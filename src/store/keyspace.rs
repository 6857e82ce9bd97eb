//! Keyspace Module
//!
//! Synchronous keyspace combining HashMap storage with LRU tracking and TTL
//! expiry. Every operation takes the current time explicitly; the async
//! [`MemoryStore`](super::MemoryStore) supplies it from its clock and
//! serializes access.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{GuardError, Result};
use crate::lock::LOCK_PREFIX;
use crate::store::{validate_entry, KeyTtl, LruTracker, StoreEntry, StoreStats};

// == Keyspace ==
/// Key-value storage with LRU eviction and per-key TTL.
///
/// Lock records are never chosen for eviction; dropping one under memory
/// pressure would hand the lock to a second holder.
#[derive(Debug)]
pub struct Keyspace {
    entries: HashMap<String, StoreEntry>,
    lru: LruTracker,
    stats: StoreStats,
    max_entries: usize,
}

impl Keyspace {
    // == Constructor ==
    /// Creates a keyspace holding at most `max_entries` keys.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: StoreStats::new(),
            max_entries,
        }
    }

    // == Get ==
    /// Returns a live value. Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str, now_ms: u64) -> Option<String> {
        self.purge_if_expired(key, now_ms);

        match self.entries.get(key) {
            Some(entry) => {
                let value = entry.value.clone();
                self.stats.record_hit();
                self.lru.touch(key);
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Set ==
    /// Stores a value, overwriting any previous value and TTL.
    pub fn set(
        &mut self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
        now_ms: u64,
    ) -> Result<()> {
        validate_entry(key, Some(&value))?;
        self.purge_if_expired(key, now_ms);
        self.insert(key, StoreEntry::new(value, ttl, now_ms), now_ms)
    }

    // == Set If Absent ==
    /// Stores a value only if no live entry exists for the key.
    pub fn set_if_absent(
        &mut self,
        key: &str,
        value: String,
        ttl: Duration,
        now_ms: u64,
    ) -> Result<bool> {
        validate_entry(key, Some(&value))?;
        self.purge_if_expired(key, now_ms);

        if self.entries.contains_key(key) {
            return Ok(false);
        }
        self.insert(key, StoreEntry::new(value, Some(ttl), now_ms), now_ms)?;
        Ok(true)
    }

    // == Delete ==
    /// Removes a live entry. Returns false when nothing live was there.
    pub fn delete(&mut self, key: &str, now_ms: u64) -> bool {
        self.purge_if_expired(key, now_ms);
        self.remove(key)
    }

    // == Compare And Delete ==
    /// Removes the entry only if its current value equals `expected`.
    pub fn compare_and_delete(&mut self, key: &str, expected: &str, now_ms: u64) -> bool {
        self.purge_if_expired(key, now_ms);

        let matches = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.value == expected);
        if matches {
            self.remove(key);
        }
        matches
    }

    // == Increment ==
    /// Adds `delta` to an integer value, creating it at 0 when absent.
    pub fn incr_by(&mut self, key: &str, delta: i64, now_ms: u64) -> Result<i64> {
        validate_entry(key, None)?;
        self.purge_if_expired(key, now_ms);

        let current = match self.entries.get(key) {
            Some(entry) => entry.value.parse::<i64>().map_err(|_| {
                GuardError::InvalidRequest(format!("Value at {key} is not an integer"))
            })?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or_else(|| {
            GuardError::InvalidRequest(format!("Increment of {key} by {delta} overflows"))
        })?;

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.value = next.to_string();
                self.lru.touch(key);
            }
            None => self.insert(key, StoreEntry::new(next.to_string(), None, now_ms), now_ms)?,
        }
        Ok(next)
    }

    // == Expire ==
    /// Resets the TTL of a live entry.
    pub fn expire(&mut self, key: &str, ttl: Duration, now_ms: u64) -> bool {
        self.purge_if_expired(key, now_ms);

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.expire_in(ttl, now_ms);
                true
            }
            None => false,
        }
    }

    // == TTL ==
    /// Remaining lifetime of a key.
    pub fn ttl(&mut self, key: &str, now_ms: u64) -> KeyTtl {
        self.purge_if_expired(key, now_ms);

        match self.entries.get(key) {
            Some(entry) => match entry.ttl_remaining_secs(now_ms) {
                Some(secs) => KeyTtl::Expiring(secs),
                None => KeyTtl::Persistent,
            },
            None => KeyTtl::Missing,
        }
    }

    // == Keys ==
    /// Live keys, sorted.
    pub fn keys(&self, now_ms: u64) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now_ms))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    // == Flush ==
    /// Removes every entry. Counters survive.
    pub fn flush(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&mut self, now_ms: u64) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now_ms))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove(key);
        }

        self.stats.record_expirations(expired_keys.len());
        expired_keys.len()
    }

    // == Stats ==
    pub fn stats(&self) -> StoreStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// At capacity, expired entries go first; a live entry is evicted only
    /// if none had expired.
    fn insert(&mut self, key: &str, entry: StoreEntry, now_ms: u64) -> Result<()> {
        let is_overwrite = self.entries.contains_key(key);

        if !is_overwrite && self.entries.len() >= self.max_entries {
            self.cleanup_expired(now_ms);
        }

        if !is_overwrite && self.entries.len() >= self.max_entries {
            match self
                .lru
                .evict_oldest_where(|candidate| !candidate.starts_with(LOCK_PREFIX))
            {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                    self.stats.record_eviction();
                }
                None => {
                    return Err(GuardError::StoreUnavailable(
                        "keyspace full and only lock records remain".to_string(),
                    ))
                }
            }
        }

        self.entries.insert(key.to_string(), entry);
        self.lru.touch(key);
        self.stats.set_total_entries(self.entries.len());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.lru.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    fn purge_if_expired(&mut self, key: &str, now_ms: u64) {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(now_ms));
        if expired {
            self.remove(key);
            self.stats.record_expirations(1);
        }
    }
}
