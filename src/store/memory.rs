//! In-Memory Shared Store
//!
//! [`SharedStore`] backed by a [`Keyspace`] behind a tokio `RwLock`. Each
//! trait call takes the write lock once, which makes every operation,
//! including set-if-absent and compare-and-delete, atomic with respect to
//! all other callers sharing the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{GuardError, Result};
use crate::store::{KeyTtl, Keyspace, SharedStore, StoreStats};

// == Memory Store ==
/// Cloneable handle to a shared in-process keyspace.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    keyspace: Arc<RwLock<Keyspace>>,
    clock: Arc<dyn Clock>,
    online: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates a store on the system clock.
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    /// Creates a store whose expiry is driven by `clock`.
    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            keyspace: Arc::new(RwLock::new(Keyspace::new(max_entries))),
            clock,
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_entries)
    }

    /// Takes the store offline or back online. While offline every
    /// operation fails with [`GuardError::StoreUnavailable`].
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Current keyspace counters.
    pub async fn stats(&self) -> StoreStats {
        self.keyspace.read().await.stats()
    }

    /// Drops every expired key, returning how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_ms();
        self.keyspace.write().await.cleanup_expired(now)
    }

    async fn open(&self) -> Result<(RwLockWriteGuard<'_, Keyspace>, u64)> {
        if !self.is_online() {
            return Err(GuardError::StoreUnavailable(
                "memory store is offline".to_string(),
            ));
        }
        let guard = self.keyspace.write().await;
        Ok((guard, self.clock.now_ms()))
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let (mut ks, now) = self.open().await?;
        let value = ks.get(key, now);
        debug!(key, hit = value.is_some(), "GET");
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let (mut ks, now) = self.open().await?;
        ks.set(key, value, ttl, now)?;
        debug!(key, ttl_ms = ttl.map(|t| t.as_millis() as u64), "SET");
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let (mut ks, now) = self.open().await?;
        let written = ks.set_if_absent(key, value, ttl, now)?;
        debug!(key, written, "SETNX");
        Ok(written)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let (mut ks, now) = self.open().await?;
        let removed = ks.delete(key, now);
        debug!(key, removed, "DEL");
        Ok(removed)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let (mut ks, now) = self.open().await?;
        let removed = ks.compare_and_delete(key, expected, now);
        debug!(key, removed, "CAD");
        Ok(removed)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let (mut ks, now) = self.open().await?;
        let value = ks.incr_by(key, delta, now)?;
        debug!(key, delta, value, "INCRBY");
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let (mut ks, now) = self.open().await?;
        Ok(ks.expire(key, ttl, now))
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let (mut ks, now) = self.open().await?;
        Ok(ks.ttl(key, now))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let (ks, now) = self.open().await?;
        Ok(ks.keys(now))
    }

    async fn flush_all(&self) -> Result<()> {
        let (mut ks, _) = self.open().await?;
        ks.flush();
        debug!("FLUSHALL");
        Ok(())
    }
}
