//! Stampede Drill
//!
//! Fires a burst of concurrent first-time reads at one cold key through a
//! [`StampedeCache`] and counts how many times the slow origin loader ran.
//! A protected cache loads once no matter how wide the burst.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cache::{validate_cache_key, StampedeCache};
use crate::error::{GuardError, Result};
use crate::store::SharedStore;

/// Upper bound on simulated callers in one drill.
pub const MAX_DRILL_CONCURRENCY: usize = 1000;

/// Loader latency used when none is given.
pub const DEFAULT_LOADER_DELAY: Duration = Duration::from_millis(100);

// == Drill Report ==
#[derive(Debug, Clone, Serialize)]
pub struct DrillReport {
    pub key: String,
    pub concurrency: usize,
    pub loader_invocations: u64,
    pub successes: usize,
    pub failures: usize,
    /// Number of different values callers saw
    pub distinct_values: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Loader ran at most once and every caller got the same value
    pub protected: bool,
    pub note: String,
}

// == Run ==
/// Clears `key`, then runs `concurrency` parallel `get_or_load` calls
/// whose loader sleeps for `loader_delay` and caches for `value_ttl`.
pub async fn run_stampede_drill<S>(
    cache: &StampedeCache<S>,
    key: &str,
    concurrency: usize,
    loader_delay: Duration,
    value_ttl: Duration,
) -> Result<DrillReport>
where
    S: SharedStore + ?Sized + 'static,
{
    validate_cache_key(key)?;
    if concurrency == 0 || concurrency > MAX_DRILL_CONCURRENCY {
        return Err(GuardError::InvalidRequest(format!(
            "concurrency must be between 1 and {MAX_DRILL_CONCURRENCY}"
        )));
    }

    cache.invalidate(key).await?;

    let invocations = Arc::new(AtomicU64::new(0));
    let started_at = Utc::now();
    let started = tokio::time::Instant::now();

    let mut callers = JoinSet::new();
    for _ in 0..concurrency {
        let cache = cache.clone();
        let key = key.to_string();
        let invocations = Arc::clone(&invocations);

        callers.spawn(async move {
            let value = format!("drill-value:{key}");
            cache
                .get_or_load(
                    &key,
                    move || async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(loader_delay).await;
                        Ok::<_, anyhow::Error>(Some(value))
                    },
                    value_ttl,
                )
                .await
        });
    }

    let mut values = HashSet::new();
    let mut successes = 0;
    let mut failures = 0;
    while let Some(joined) = callers.join_next().await {
        match joined {
            Ok(Ok(value)) => {
                successes += 1;
                values.insert(value);
            }
            Ok(Err(err)) => {
                failures += 1;
                warn!(key, error = %err, "drill caller failed");
            }
            Err(err) => {
                failures += 1;
                warn!(key, error = %err, "drill caller panicked");
            }
        }
    }

    let loader_invocations = invocations.load(Ordering::SeqCst);
    let protected = loader_invocations <= 1 && failures == 0 && values.len() == 1;
    let note = if protected {
        format!("{concurrency} concurrent callers, origin loaded {loader_invocations} time(s)")
    } else {
        format!(
            "stampede not contained: {loader_invocations} loads, {failures} failures, {} distinct values",
            values.len()
        )
    };

    let report = DrillReport {
        key: key.to_string(),
        concurrency,
        loader_invocations,
        successes,
        failures,
        distinct_values: values.len(),
        started_at,
        finished_at: Utc::now(),
        duration_ms: started.elapsed().as_millis() as u64,
        protected,
        note,
    };

    info!(
        key,
        concurrency,
        loads = report.loader_invocations,
        duration_ms = report.duration_ms,
        protected,
        "stampede drill finished"
    );
    Ok(report)
}
