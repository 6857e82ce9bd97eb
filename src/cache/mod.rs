//! Stampede-Protected Cache
//!
//! Cache-aside reads over a [`SharedStore`] where concurrent misses on the
//! same key elect a single loader through a [`DistributedLock`]:
//!
//! 1. read the key, return on hit;
//! 2. on miss, try the key's lock; if another caller holds it, back off and
//!    go back to step 1;
//! 3. with the lock held, read again, and only if still absent run the
//!    loader and write its result;
//! 4. release the lock on every path.
//!
//! While loaders finish inside the lock TTL, at most one loader per key is
//! in flight. A loader that outlives the TTL lets a second one start, so
//! loaders must be idempotent reads.

mod lookup;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{GuardError, Result};
use crate::lock::{Backoff, DistributedLock, HolderToken, RetryPolicy, CACHE_LOCK_PREFIX};
use crate::store::{KeyTtl, SharedStore, MAX_KEY_LENGTH};

pub use lookup::{LoaderStats, LoaderStatsSnapshot, Lookup, LookupSource};

/// Default lifetime of a loader lock.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);

/// Longest cache key whose loader lock still fits in the store.
pub const MAX_CACHE_KEY_LENGTH: usize = MAX_KEY_LENGTH - CACHE_LOCK_PREFIX.len();

/// Loader lock for a cache key.
pub fn cache_lock_key(key: &str) -> String {
    format!("{CACHE_LOCK_PREFIX}{key}")
}

/// Rejects keys the cache cannot lock.
pub fn validate_cache_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(GuardError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_CACHE_KEY_LENGTH {
        return Err(GuardError::InvalidRequest(format!(
            "Cache key exceeds maximum length of {MAX_CACHE_KEY_LENGTH} characters"
        )));
    }
    Ok(())
}

// == Stampede Cache ==
/// Cache-aside loader with single-flight loads per key.
pub struct StampedeCache<S: SharedStore + ?Sized> {
    store: Arc<S>,
    lock: DistributedLock<S>,
    lock_ttl: Duration,
    retry: RetryPolicy,
    stats: Arc<LoaderStats>,
}

impl<S: SharedStore + ?Sized> Clone for StampedeCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lock: self.lock.clone(),
            lock_ttl: self.lock_ttl,
            retry: self.retry,
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<S: SharedStore + ?Sized> StampedeCache<S> {
    // == Constructors ==
    pub fn new(store: Arc<S>) -> Self {
        Self {
            lock: DistributedLock::new(Arc::clone(&store)),
            store,
            lock_ttl: DEFAULT_LOCK_TTL,
            retry: RetryPolicy::default(),
            stats: Arc::new(LoaderStats::default()),
        }
    }

    pub fn from_config(store: Arc<S>, config: &Config) -> Self {
        Self::new(store)
            .with_lock_ttl(config.lock_ttl())
            .with_retry_policy(config.retry_policy())
    }

    /// Sets how long a loader may hold its key's lock.
    pub fn with_lock_ttl(mut self, lock_ttl: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self
    }

    /// Sets the bound on waiting for another caller's load.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn stats(&self) -> LoaderStatsSnapshot {
        self.stats.snapshot()
    }

    // == Get Or Load ==
    /// Returns the cached value for `key`, loading and caching it on miss.
    ///
    /// `None` from the loader is returned as `None` and not cached. Loader
    /// errors come back as [`GuardError::Loader`] after the lock is
    /// released and are never retried. Lock contention is retried under the
    /// cache's [`RetryPolicy`] and ends in [`GuardError::LockTimeout`].
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, loader: F, ttl: Duration) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        Ok(self.get_or_load_traced(key, loader, ttl).await?.value)
    }

    /// [`get_or_load`](Self::get_or_load) that also reports how the value
    /// was obtained.
    pub async fn get_or_load_traced<T, F, Fut>(
        &self,
        key: &str,
        loader: F,
        ttl: Duration,
    ) -> Result<Lookup<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        validate_cache_key(key)?;

        let started = Instant::now();
        let lock_key = cache_lock_key(key);
        let mut backoff = Backoff::new(self.retry);

        loop {
            if let Some(value) = self.read::<T>(key).await? {
                self.stats.record_hit();
                let source = if backoff.attempts() == 0 {
                    LookupSource::Hit
                } else {
                    LookupSource::PeerLoaded
                };
                return Ok(Lookup {
                    value: Some(value),
                    source,
                    lock_attempts: backoff.attempts(),
                    expires_in: self.expires_in(key).await?,
                    elapsed: started.elapsed(),
                });
            }
            if backoff.attempts() == 0 {
                self.stats.record_miss();
            }

            let token = HolderToken::generate("cache");
            if self.lock.acquire(&lock_key, &token, self.lock_ttl).await? {
                let loaded = self.load_locked(key, loader, ttl).await;
                let released = self.lock.release(&lock_key, &token).await;

                let (value, source) = loaded?;
                released?;
                let expires_in = match (&value, source) {
                    (None, _) => None,
                    (Some(_), LookupSource::Loaded) => Some(ttl),
                    (Some(_), _) => self.expires_in(key).await?,
                };
                return Ok(Lookup {
                    value,
                    source,
                    lock_attempts: backoff.attempts() + 1,
                    expires_in,
                    elapsed: started.elapsed(),
                });
            }

            self.stats.record_contended();
            match backoff.next_delay() {
                Some(delay) => {
                    debug!(
                        key,
                        attempt = backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "load in progress elsewhere, waiting"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    self.stats.record_timeout();
                    warn!(key, attempts = backoff.attempts(), "gave up waiting for loader lock");
                    return Err(backoff.timeout(&lock_key));
                }
            }
        }
    }

    // == Invalidate ==
    /// Drops a cached key so the next read loads it again.
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let removed = self.store.delete(key).await?;
        debug!(key, removed, "cache invalidate");
        Ok(removed)
    }

    /// Runs with the key's lock held.
    async fn load_locked<T, F, Fut>(
        &self,
        key: &str,
        loader: F,
        ttl: Duration,
    ) -> Result<(Option<T>, LookupSource)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        if let Some(value) = self.read::<T>(key).await? {
            self.stats.record_hit();
            debug!(key, "filled while acquiring lock");
            return Ok((Some(value), LookupSource::PeerLoaded));
        }

        let load_started = Instant::now();
        let result = loader().await;
        let load_time = load_started.elapsed();
        if load_time > self.lock_ttl {
            warn!(
                key,
                load_ms = load_time.as_millis() as u64,
                lock_ttl_ms = self.lock_ttl.as_millis() as u64,
                "loader outlived its lock; a concurrent load may have run"
            );
        }

        match result {
            Ok(Some(value)) => {
                self.stats.record_load(true);
                let encoded = serde_json::to_string(&value)?;
                self.store.set(key, encoded, Some(ttl)).await?;
                debug!(key, load_ms = load_time.as_millis() as u64, "loaded and cached");
                Ok((Some(value), LookupSource::Loaded))
            }
            Ok(None) => {
                self.stats.record_load(false);
                debug!(key, "loader returned nothing; not cached");
                Ok((None, LookupSource::Loaded))
            }
            Err(err) => {
                self.stats.record_loader_failure();
                warn!(key, error = %err, "loader failed");
                Err(GuardError::Loader(err))
            }
        }
    }

    async fn expires_in(&self, key: &str) -> Result<Option<Duration>> {
        Ok(match self.store.ttl(key).await? {
            KeyTtl::Expiring(secs) => Some(Duration::from_secs(secs)),
            KeyTtl::Persistent | KeyTtl::Missing => None,
        })
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
