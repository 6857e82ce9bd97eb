//! Shared Store Module
//!
//! The key-value contract the lock, cache and gate are built on, plus an
//! in-process implementation with TTL expiry and LRU eviction.

mod entry;
mod keyspace;
mod lru;
mod memory;
mod stats;


use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{GuardError, Result};

// Re-export public types
pub use entry::StoreEntry;
pub use keyspace::Keyspace;
pub use lru::LruTracker;
pub use memory::MemoryStore;
pub use stats::StoreStats;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB

/// Prefix for keys written by [`SharedStore::ping`]
pub const HEALTH_CHECK_PREFIX: &str = "health:check:";

// == Key TTL ==
/// Result of a TTL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "seconds")]
pub enum KeyTtl {
    /// Key is live and expires in this many seconds
    Expiring(u64),
    /// Key is live with no expiry
    Persistent,
    /// Key does not exist
    Missing,
}

impl KeyTtl {
    /// Redis-style integer: seconds, `-1` for persistent, `-2` for missing.
    pub fn as_code(self) -> i64 {
        match self {
            KeyTtl::Expiring(secs) => secs as i64,
            KeyTtl::Persistent => -1,
            KeyTtl::Missing => -2,
        }
    }
}

// == Shared Store Trait ==
/// Atomic key-value operations shared by every process using the layer.
///
/// Each method is a single atomic step against the store. Values are opaque
/// strings; callers own serialization.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Reads a live key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a key, replacing any value and TTL. `None` means no expiry.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// Writes only if the key is absent. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool>;

    /// Deletes a key. Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Deletes a key only while it still holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Adds `delta` to an integer key (absent counts as 0) and returns the
    /// new value. Any existing TTL is kept.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

    /// Subtracts `delta` from an integer key.
    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let negated = delta
            .checked_neg()
            .ok_or_else(|| GuardError::InvalidRequest(format!("delta {delta} out of range")))?;
        self.incr_by(key, negated).await
    }

    /// Resets the TTL of a live key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Remaining lifetime of a key.
    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// All live keys.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Removes every key.
    async fn flush_all(&self) -> Result<()>;

    /// Round-trips a throwaway key to prove the store accepts writes and
    /// serves reads.
    async fn ping(&self) -> Result<()> {
        let key = format!("{HEALTH_CHECK_PREFIX}{}", Uuid::now_v7());
        let probe = Uuid::now_v7().to_string();

        self.set(&key, probe.clone(), Some(Duration::from_secs(60)))
            .await?;
        let read_back = self.get(&key).await?;
        self.delete(&key).await?;

        match read_back {
            Some(value) if value == probe => Ok(()),
            other => Err(GuardError::StoreUnavailable(format!(
                "health probe mismatch on {key}: read {other:?}"
            ))),
        }
    }
}

// == Key Validation ==
/// Rejects keys and values the store will not hold.
pub fn validate_entry(key: &str, value: Option<&str>) -> Result<()> {
    if key.is_empty() {
        return Err(GuardError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(GuardError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if let Some(value) = value {
        if value.len() > MAX_VALUE_SIZE {
            return Err(GuardError::InvalidRequest(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ttl_codes() {
        assert_eq!(KeyTtl::Expiring(60).as_code(), 60);
        assert_eq!(KeyTtl::Persistent.as_code(), -1);
        assert_eq!(KeyTtl::Missing.as_code(), -2);
    }

    #[test]
    fn test_validate_entry() {
        assert!(validate_entry("k", Some("v")).is_ok());
        assert!(matches!(
            validate_entry("", None),
            Err(GuardError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_entry(&"x".repeat(MAX_KEY_LENGTH + 1), None),
            Err(GuardError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_entry("k", Some(&"x".repeat(MAX_VALUE_SIZE + 1))),
            Err(GuardError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_decr_by_rejects_min_delta() {
        let store = MemoryStore::new(10);
        let result = store.decr_by("counter", i64::MIN).await;
        assert!(matches!(result, Err(GuardError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_ping_leaves_no_key_behind() {
        let store = MemoryStore::new(10);
        store.ping().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }
}
