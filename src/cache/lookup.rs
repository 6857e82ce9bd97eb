//! Lookup results and loader counters for the stampede-protected cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

// == Lookup Source ==
/// Where a [`Lookup`] value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupSource {
    /// Found on the first read
    Hit,
    /// Missed at first, then filled by another caller's load
    PeerLoaded,
    /// This call ran the loader
    Loaded,
}

// == Lookup ==
/// A cache read together with how it was satisfied.
#[derive(Debug, Clone)]
pub struct Lookup<T> {
    /// The value, or None when the loader found nothing
    pub value: Option<T>,
    pub source: LookupSource,
    /// Lock attempts made, 0 for a plain hit
    pub lock_attempts: u32,
    /// Remaining lifetime of the cached value; None when nothing was
    /// cached or the value never expires
    pub expires_in: Option<Duration>,
    pub elapsed: Duration,
}

impl<T> Lookup<T> {
    /// True when no origin load was needed by this call.
    pub fn is_cache_hit(&self) -> bool {
        !matches!(self.source, LookupSource::Loaded)
    }
}

// == Loader Stats ==
/// Counters shared by all clones of a cache.
#[derive(Debug, Default)]
pub struct LoaderStats {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    empty_loads: AtomicU64,
    loader_failures: AtomicU64,
    contended: AtomicU64,
    timeouts: AtomicU64,
}

impl LoaderStats {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load(&self, found: bool) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        if !found {
            self.empty_loads.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_loader_failure(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.loader_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_contended(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoaderStatsSnapshot {
        LoaderStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            empty_loads: self.empty_loads.load(Ordering::Relaxed),
            loader_failures: self.loader_failures.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LoaderStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoaderStatsSnapshot {
    /// Reads answered from the store, including after waiting
    pub hits: u64,
    /// First reads that found nothing
    pub misses: u64,
    /// Loader invocations
    pub loads: u64,
    /// Loader invocations that returned nothing
    pub empty_loads: u64,
    /// Loader invocations that failed
    pub loader_failures: u64,
    /// Lock attempts lost to another caller
    pub contended: u64,
    /// Waits that ended in a lock timeout
    pub timeouts: u64,
}
