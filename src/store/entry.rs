//! Store Entry Module
//!
//! A single keyspace slot: value plus absolute expiry. Time is always passed
//! in by the caller so expiry can be tested against a manual clock.

use std::time::Duration;

// == Store Entry ==
/// A stored value with creation and expiry metadata.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The stored value (serialized by the caller)
    pub value: String,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl StoreEntry {
    // == Constructor ==
    /// Creates a new entry written at `now_ms` with an optional TTL.
    pub fn new(value: String, ttl: Option<Duration>, now_ms: u64) -> Self {
        Self {
            value,
            created_at: now_ms,
            expires_at: ttl.map(|ttl| deadline(now_ms, ttl)),
        }
    }

    // == Is Expired ==
    /// An entry is expired once `now_ms` reaches its expiry instant.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    // == Expire ==
    /// Replaces the expiry with `now_ms + ttl`.
    pub fn expire_in(&mut self, ttl: Duration, now_ms: u64) {
        self.expires_at = Some(deadline(now_ms, ttl));
    }

    // == Time To Live ==
    /// Remaining TTL in milliseconds, or None if the entry never expires.
    ///
    /// Returns `Some(0)` once the entry has expired.
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(now_ms))
    }

    /// Remaining TTL in whole seconds, rounded up so a live key never
    /// reports zero.
    pub fn ttl_remaining_secs(&self, now_ms: u64) -> Option<u64> {
        self.ttl_remaining_ms(now_ms).map(|ms| ms.div_ceil(1000))
    }
}

fn deadline(now_ms: u64, ttl: Duration) -> u64 {
    now_ms.saturating_add(ttl.as_millis() as u64)
}
