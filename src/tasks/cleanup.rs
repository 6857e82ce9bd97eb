//! Expiry Sweeper
//!
//! Expired keys are already invisible to reads; the sweeper reclaims the
//! memory of keys nobody reads again, such as abandoned lock records.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::MemoryStore;

/// Spawns a task that sweeps `store` every `interval`.
///
/// Runs until the returned handle is aborted, which `main` does on
/// shutdown.
pub fn spawn_cleanup_task(store: MemoryStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "expiry sweeper started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = store.cleanup_expired().await;
            if removed > 0 {
                info!(removed, "expiry sweep removed keys");
            } else {
                debug!("expiry sweep found nothing");
            }
        }
    })
}
