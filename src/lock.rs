//! Distributed Lock Module
//!
//! Mutual exclusion over a [`SharedStore`]: a lock is a key in the `lock:`
//! namespace whose value is the holder's token. Acquisition is a single
//! set-if-absent; release is a compare-and-delete on the token, so a holder
//! whose record already expired cannot delete its successor's lock.
//!
//! There is no reentrancy and no wait queue. [`DistributedLock::acquire`]
//! fails fast; [`DistributedLock::acquire_with_retry`] and [`Backoff`] give
//! callers a bounded, jittered retry loop with an overall deadline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{GuardError, Result};
use crate::store::SharedStore;

/// Namespace for lock records, disjoint from cache keys.
pub const LOCK_PREFIX: &str = "lock:";

/// Lock key guarding `scope`.
///
/// The scope must name the shared state being protected and nothing about
/// the requester; two callers protecting the same state must derive the
/// same key.
pub fn lock_key_for(scope: &str) -> String {
    format!("{LOCK_PREFIX}{scope}")
}

/// Sub-namespace of cache loader locks: `lock:cache:<cache key>`.
pub const CACHE_LOCK_PREFIX: &str = "lock:cache:";

/// Sub-namespace of seat locks: `lock:seat:<course id>`.
pub const SEAT_LOCK_PREFIX: &str = "lock:seat:";

// == Holder Token ==
/// Value stored in a lock record, unique per acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HolderToken(String);

impl HolderToken {
    /// Fresh token `<owner>:<uuid v7>`.
    pub fn generate(owner: &str) -> Self {
        Self(format!("{owner}:{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HolderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// == Retry Policy ==
/// Bounds on waiting for a contended lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Sleep after the first failed attempt, before jitter
    pub base_backoff: Duration,
    /// Ceiling for the doubled backoff, before jitter
    pub max_backoff: Duration,
    /// Total time budget measured from the first attempt
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(800),
            deadline: Duration::from_secs(5),
        }
    }
}

/// Result of one backoff step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffStep {
    /// Sleep duration in milliseconds, jitter included
    pub sleep_ms: u64,
    /// Backoff to feed into the next step
    pub next_backoff_ms: u64,
}

/// Exponential backoff with additive jitter.
///
/// Jitter is `jitter_seed % (current / 2 + 1)`, so the sleep stays within
/// `[current, 1.5 * current]`. The next backoff doubles, capped at `max`.
pub fn compute_backoff_with_jitter(current_ms: u64, max_ms: u64, jitter_seed: u64) -> BackoffStep {
    let max_jitter = (current_ms / 2).saturating_add(1);
    let jitter = jitter_seed % max_jitter;

    BackoffStep {
        sleep_ms: current_ms.saturating_add(jitter),
        next_backoff_ms: current_ms.saturating_mul(2).min(max_ms),
    }
}

// == Backoff ==
/// Attempt and deadline accounting for one contended wait.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    started: Instant,
    attempts: u32,
    current_ms: u64,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            current_ms: policy.base_backoff.as_millis() as u64,
            policy,
            started: Instant::now(),
            attempts: 0,
        }
    }

    /// Failed attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Records a failed attempt and returns how long to sleep before the
    /// next one, or `None` once attempts or time are used up. The sleep is
    /// clipped so the next attempt lands no later than the deadline.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts >= self.policy.max_attempts {
            return None;
        }

        let remaining = self.policy.deadline.checked_sub(self.elapsed())?;
        if remaining.is_zero() {
            return None;
        }

        let step = compute_backoff_with_jitter(
            self.current_ms,
            self.policy.max_backoff.as_millis() as u64,
            rand::random::<u64>(),
        );
        self.current_ms = step.next_backoff_ms;

        Some(Duration::from_millis(step.sleep_ms).min(remaining))
    }

    /// Timeout error describing this wait.
    pub fn timeout(&self, key: &str) -> GuardError {
        GuardError::LockTimeout {
            key: key.to_string(),
            attempts: self.attempts,
            waited_ms: self.elapsed().as_millis() as u64,
        }
    }
}

// == Distributed Lock ==
/// Lock primitive over a shared store.
pub struct DistributedLock<S: SharedStore + ?Sized> {
    store: Arc<S>,
}

impl<S: SharedStore + ?Sized> Clone for DistributedLock<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SharedStore + ?Sized> DistributedLock<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    // == Acquire ==
    /// One atomic set-if-absent. Returns immediately.
    pub async fn acquire(&self, key: &str, token: &HolderToken, ttl: Duration) -> Result<bool> {
        let acquired = self
            .store
            .set_if_absent(key, token.as_str().to_string(), ttl)
            .await?;
        debug!(key, holder = %token, acquired, "lock acquire");
        Ok(acquired)
    }

    // == Release ==
    /// Deletes the lock only if `token` still holds it.
    ///
    /// Returns false when the record already expired or now belongs to
    /// someone else; that case is logged because it means the critical
    /// section outlived its TTL.
    pub async fn release(&self, key: &str, token: &HolderToken) -> Result<bool> {
        let released = self.store.compare_and_delete(key, token.as_str()).await?;
        if released {
            debug!(key, holder = %token, "lock released");
        } else {
            warn!(key, holder = %token, "lock no longer held at release; TTL elapsed first");
        }
        Ok(released)
    }

    /// Current holder token, if the lock is held.
    pub async fn holder(&self, key: &str) -> Result<Option<String>> {
        self.store.get(key).await
    }

    // == Acquire With Retry ==
    /// Retries [`acquire`](Self::acquire) under `policy`.
    ///
    /// Returns the number of attempts it took, or
    /// [`GuardError::LockTimeout`] once the policy is exhausted.
    pub async fn acquire_with_retry(
        &self,
        key: &str,
        token: &HolderToken,
        ttl: Duration,
        policy: RetryPolicy,
    ) -> Result<u32> {
        let mut backoff = Backoff::new(policy);
        loop {
            if self.acquire(key, token, ttl).await? {
                return Ok(backoff.attempts() + 1);
            }
            match backoff.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    warn!(key, attempts = backoff.attempts(), "lock wait timed out");
                    return Err(backoff.timeout(key));
                }
            }
        }
    }
}
