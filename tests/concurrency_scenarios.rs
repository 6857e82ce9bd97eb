//! Concurrency Scenarios
//!
//! End-to-end behavior of the lock, cache and gate under concurrent
//! callers sharing one in-memory store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use seatguard::clock::ManualClock;
use seatguard::gate::{EnrollmentCounter, MemoryLedger, RejectReason};
use seatguard::cache::cache_lock_key;
use seatguard::lock::{lock_key_for, HolderToken, RetryPolicy};
use seatguard::{CapacityGate, DistributedLock, MemoryStore, SeatOutcome, SharedStore, StampedeCache};
use tokio::task::JoinSet;

const LOCK_TTL: Duration = Duration::from_secs(10);

// == Helpers ==

type Gate = CapacityGate<MemoryStore, MemoryLedger>;

async fn gate_for(capacity: u32, io_delay: Duration) -> Gate {
    let ledger = MemoryLedger::new().with_io_delay(io_delay);
    ledger.insert(EnrollmentCounter::new(1, capacity)).await;
    CapacityGate::new(Arc::new(MemoryStore::new(1000)), Arc::new(ledger))
}

/// Resubmits on contention until the gate gives a real answer.
async fn enroll(gate: &Gate, caller_id: u64) -> SeatOutcome {
    loop {
        match gate.try_acquire_seat(1, caller_id, LOCK_TTL).await {
            Ok(SeatOutcome::Rejected { reason: RejectReason::Contended }) => {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Ok(outcome) => return outcome,
            Err(err) => panic!("seat request failed: {err}"),
        }
    }
}

async fn enroll_all(gate: &Gate, callers: u64) -> Vec<SeatOutcome> {
    let mut set = JoinSet::new();
    for caller_id in 0..callers {
        let gate = gate.clone();
        set.spawn(async move { enroll(&gate, caller_id).await });
    }

    let mut outcomes = Vec::new();
    while let Some(outcome) = set.join_next().await {
        outcomes.push(outcome.unwrap());
    }
    outcomes
}

async fn stampede(cache: &StampedeCache<MemoryStore>, callers: usize, loads: &Arc<AtomicU32>) -> Vec<Option<String>> {
    let mut set = JoinSet::new();
    for _ in 0..callers {
        let cache = cache.clone();
        let loads = Arc::clone(loads);
        set.spawn(async move {
            cache
                .get_or_load(
                    "K",
                    move || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, anyhow::Error>(Some("test-value".to_string()))
                    },
                    Duration::from_secs(60),
                )
                .await
                .unwrap()
        });
    }

    let mut values = Vec::new();
    while let Some(value) = set.join_next().await {
        values.push(value.unwrap());
    }
    values
}

// == Stampede Protection ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_callers_share_one_load() {
    let cache = StampedeCache::new(Arc::new(MemoryStore::new(100))).with_lock_ttl(LOCK_TTL);
    let loads = Arc::new(AtomicU32::new(0));

    let values = stampede(&cache, 5, &loads).await;

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(values.len(), 5);
    assert!(values.iter().all(|v| v.as_deref() == Some("test-value")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_callers_share_one_load() {
    let cache = StampedeCache::new(Arc::new(MemoryStore::new(100)));
    let loads = Arc::new(AtomicU32::new(0));

    let values = stampede(&cache, 100, &loads).await;

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(values.iter().all(|v| v.as_deref() == Some("test-value")));
    assert_eq!(cache.stats().loads, 1);
}

#[tokio::test]
async fn slow_loader_past_lock_ttl_keeps_successor_lock() {
    let store = Arc::new(MemoryStore::new(100));
    let cache = StampedeCache::new(Arc::clone(&store))
        .with_lock_ttl(Duration::from_millis(50))
        .with_retry_policy(RetryPolicy {
            max_attempts: 20,
            base_backoff: Duration::from_millis(60),
            max_backoff: Duration::from_millis(60),
            deadline: Duration::from_secs(2),
        });
    let loads = Arc::new(AtomicU32::new(0));

    let mut set = JoinSet::new();
    for _ in 0..2 {
        let cache = cache.clone();
        let loads = Arc::clone(&loads);
        set.spawn(async move {
            cache
                .get_or_load(
                    "slow",
                    move || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(150)).await;
                        Ok::<_, anyhow::Error>(Some(7u32))
                    },
                    Duration::from_secs(60),
                )
                .await
        });
    }
    while let Some(result) = set.join_next().await {
        assert_eq!(result.unwrap().unwrap(), Some(7));
    }

    // Once the first lock lapsed a second loader was allowed in, and
    // neither release touched the other's record.
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert!(store.get(&cache_lock_key("slow")).await.unwrap().is_none());
}

// == Lock Semantics ==

#[tokio::test]
async fn release_then_acquire_by_another_holder() {
    let lock = DistributedLock::new(Arc::new(MemoryStore::new(10)));
    let a = HolderToken::generate("a");
    let b = HolderToken::generate("b");

    assert!(lock.acquire("lock:x", &a, LOCK_TTL).await.unwrap());
    assert!(!lock.acquire("lock:x", &b, LOCK_TTL).await.unwrap());
    assert!(lock.release("lock:x", &a).await.unwrap());
    assert!(lock.acquire("lock:x", &b, LOCK_TTL).await.unwrap());
}

#[tokio::test]
async fn expired_holder_cannot_release_new_holder() {
    let clock = ManualClock::new(1_000);
    let lock = DistributedLock::new(Arc::new(MemoryStore::with_clock(10, Arc::new(clock.clone()))));
    let a = HolderToken::generate("a");
    let b = HolderToken::generate("b");

    assert!(lock.acquire("lock:x", &a, Duration::from_secs(10)).await.unwrap());
    clock.advance(Duration::from_secs(11));
    assert!(lock.acquire("lock:x", &b, Duration::from_secs(10)).await.unwrap());

    assert!(!lock.release("lock:x", &a).await.unwrap());
    assert_eq!(lock.holder("lock:x").await.unwrap().as_deref(), Some(b.as_str()));
}

// == Capacity Gate ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn capacity_bounds_concurrent_admissions() {
    let gate = gate_for(5, Duration::ZERO).await;

    let outcomes = enroll_all(&gate, 12).await;

    let admitted = outcomes.iter().filter(|o| o.is_admitted()).count();
    assert_eq!(admitted, 5);
    assert_eq!(gate.counter(1).await.unwrap().selected, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_seat_goes_to_exactly_one_caller() {
    let gate = gate_for(1, Duration::from_millis(30)).await;

    let outcomes = enroll_all(&gate, 2).await;

    let admitted = outcomes.iter().filter(|o| o.is_admitted()).count();
    let full = outcomes
        .iter()
        .filter(|o| **o == SeatOutcome::Rejected { reason: RejectReason::Full })
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(full, 1);
    assert_eq!(gate.counter(1).await.unwrap().selected, 1);
}

/// Locks keyed by course and student do not exclude each other, so the
/// read-check-write races and both callers take the last seat.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn caller_scoped_locks_over_admit() {
    use seatguard::gate::SeatLedger;

    let store = Arc::new(MemoryStore::new(100));
    let ledger = Arc::new(MemoryLedger::new().with_io_delay(Duration::from_millis(30)));
    ledger.insert(EnrollmentCounter::new(1, 1)).await;

    let mut set = JoinSet::new();
    for caller_id in [10u64, 20] {
        let lock = DistributedLock::new(Arc::clone(&store));
        let ledger = Arc::clone(&ledger);
        set.spawn(async move {
            let key = lock_key_for(&format!("course:1:{caller_id}"));
            let token = HolderToken::generate("student");
            assert!(lock.acquire(&key, &token, LOCK_TTL).await.unwrap());

            let counter = ledger.load(1).await.unwrap().unwrap();
            let admitted = counter.has_room();
            if admitted {
                ledger.store_selected(1, counter.selected + 1).await.unwrap();
            }

            lock.release(&key, &token).await.unwrap();
            admitted
        });
    }

    let mut admitted = 0;
    while let Some(result) = set.join_next().await {
        if result.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 2);
}

#[tokio::test]
async fn store_outage_fails_cache_and_gate() {
    let store = Arc::new(MemoryStore::new(100));
    let cache = StampedeCache::new(Arc::clone(&store));
    let ledger = Arc::new(MemoryLedger::new());
    ledger.insert(EnrollmentCounter::new(1, 3)).await;
    let gate = CapacityGate::new(Arc::clone(&store), ledger);

    store.set_online(false);

    let cached = cache
        .get_or_load("k", || async { Ok::<_, anyhow::Error>(Some(1u8)) }, LOCK_TTL)
        .await;
    let seat = gate.try_acquire_seat(1, 1, LOCK_TTL).await;

    assert!(matches!(cached, Err(seatguard::GuardError::StoreUnavailable(_))));
    assert!(matches!(seat, Err(seatguard::GuardError::StoreUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cached_course_load_leaves_seats_open() {
    let store = Arc::new(MemoryStore::new(100));
    let cache = StampedeCache::new(Arc::clone(&store));
    let ledger = Arc::new(MemoryLedger::new());
    ledger.insert(EnrollmentCounter::new(1, 30)).await;
    let gate = CapacityGate::new(Arc::clone(&store), ledger);

    let loading = tokio::spawn({
        let cache = cache.clone();
        async move {
            cache
                .get_or_load(
                    "course:1",
                    || async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok::<_, anyhow::Error>(Some("intro".to_string()))
                    },
                    LOCK_TTL,
                )
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(store.get(&cache_lock_key("course:1")).await.unwrap().is_some());

    let seat = gate.try_acquire_seat(1, 7, LOCK_TTL).await.unwrap();

    assert_eq!(seat, SeatOutcome::Admitted { selected: 1, capacity: 30 });
    assert_eq!(loading.await.unwrap().unwrap().as_deref(), Some("intro"));
}

// == Properties ==

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    // K callers resubmitting on contention against capacity C end with
    // exactly min(K, C) admissions.
    #[test]
    fn prop_admissions_equal_min_of_callers_and_capacity(capacity in 0u32..8, callers in 1u64..16) {
        let (admitted, selected) = tokio_test::block_on(async {
            let gate = gate_for(capacity, Duration::ZERO).await;
            let outcomes = enroll_all(&gate, callers).await;
            let admitted = outcomes.iter().filter(|o| o.is_admitted()).count() as u32;
            (admitted, gate.counter(1).await.unwrap().selected)
        });

        let expected = capacity.min(callers as u32);
        prop_assert_eq!(admitted, expected);
        prop_assert_eq!(selected, expected);
    }
}
