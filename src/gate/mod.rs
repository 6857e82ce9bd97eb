//! Capacity Gate
//!
//! Bounds course enrollment by running the read-check-increment on a
//! course's seat counter under that course's distributed lock.
//!
//! The lock key, `lock:seat:<id>`, is derived from the course id alone.
//! Deriving it from the student as well would give every student a private
//! lock, and two students could both read a free seat before either wrote.
//! Its sub-namespace keeps it apart from cache loader locks, so loading a
//! cached `course:<id>` never contends with seat requests for that course.

mod ledger;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{GuardError, Result};
use crate::lock::{DistributedLock, HolderToken, SEAT_LOCK_PREFIX};
use crate::store::SharedStore;

pub use ledger::{EnrollmentCounter, MemoryLedger, SeatLedger};

/// Lock key serializing seat changes for one course.
pub fn seat_lock_key(resource_id: u64) -> String {
    format!("{SEAT_LOCK_PREFIX}{resource_id}")
}

/// Shared-store counter mirroring admissions for one course.
pub fn enrollment_tally_key(resource_id: u64) -> String {
    format!("course:{resource_id}:enrollment")
}

// == Seat Outcome ==
/// Why a seat request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No seats left
    Full,
    /// Another request held the course lock; safe to resubmit
    Contended,
    /// Nothing to give back; the course has no selected seats
    Empty,
}

/// Result of a gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SeatOutcome {
    Admitted { selected: u32, capacity: u32 },
    Released { selected: u32, capacity: u32 },
    Rejected { reason: RejectReason },
}

impl SeatOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, SeatOutcome::Admitted { .. })
    }

    fn rejected(reason: RejectReason) -> Self {
        SeatOutcome::Rejected { reason }
    }
}

/// Result of [`CapacityGate::register_course`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// New course stored
    Created(EnrollmentCounter),
    /// Course already existed with the same capacity; left untouched
    Existing(EnrollmentCounter),
    /// Another request held the course lock; safe to resubmit
    Contended,
}

// == Capacity Gate ==
/// Admission gate over a [`SeatLedger`], serialized by a
/// [`DistributedLock`] on the shared store.
///
/// The gate never retries: contention comes back as
/// [`RejectReason::Contended`] and the caller decides whether to resubmit.
/// It does not detect a student enrolling twice; that is the enrollment
/// table's uniqueness constraint.
pub struct CapacityGate<S: SharedStore + ?Sized, L: SeatLedger + ?Sized> {
    store: Arc<S>,
    lock: DistributedLock<S>,
    ledger: Arc<L>,
}

impl<S: SharedStore + ?Sized, L: SeatLedger + ?Sized> Clone for CapacityGate<S, L> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lock: self.lock.clone(),
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<S: SharedStore + ?Sized, L: SeatLedger + ?Sized> CapacityGate<S, L> {
    pub fn new(store: Arc<S>, ledger: Arc<L>) -> Self {
        Self {
            lock: DistributedLock::new(Arc::clone(&store)),
            store,
            ledger,
        }
    }

    // == Try Acquire Seat ==
    /// Takes one seat in `resource_id` for `caller_id` if any is free.
    ///
    /// The course lock is released before this returns, on every path.
    /// Unknown courses fail with [`GuardError::NotFound`].
    pub async fn try_acquire_seat(
        &self,
        resource_id: u64,
        caller_id: u64,
        lock_ttl: Duration,
    ) -> Result<SeatOutcome> {
        let outcome = self
            .with_course_lock(resource_id, caller_id, lock_ttl, |counter| {
                if counter.has_room() {
                    Some(counter.selected + 1)
                } else {
                    None
                }
            })
            .await?;

        let outcome = match outcome {
            Locked::Contended => SeatOutcome::rejected(RejectReason::Contended),
            Locked::Unchanged(_) => SeatOutcome::rejected(RejectReason::Full),
            Locked::Updated(counter) => {
                self.adjust_tally(resource_id, 1).await;
                SeatOutcome::Admitted {
                    selected: counter.selected,
                    capacity: counter.capacity,
                }
            }
        };

        info!(resource_id, caller_id, ?outcome, "seat request decided");
        Ok(outcome)
    }

    // == Release Seat ==
    /// Gives one seat back, as when a student drops the course.
    pub async fn release_seat(
        &self,
        resource_id: u64,
        caller_id: u64,
        lock_ttl: Duration,
    ) -> Result<SeatOutcome> {
        let outcome = self
            .with_course_lock(resource_id, caller_id, lock_ttl, |counter| {
                counter.selected.checked_sub(1)
            })
            .await?;

        let outcome = match outcome {
            Locked::Contended => SeatOutcome::rejected(RejectReason::Contended),
            Locked::Unchanged(_) => SeatOutcome::rejected(RejectReason::Empty),
            Locked::Updated(counter) => {
                self.adjust_tally(resource_id, -1).await;
                SeatOutcome::Released {
                    selected: counter.selected,
                    capacity: counter.capacity,
                }
            }
        };

        info!(resource_id, caller_id, ?outcome, "seat release decided");
        Ok(outcome)
    }

    // == Register Course ==
    /// Adds a course under its seat lock.
    ///
    /// Capacity is fixed once a course exists: registering it again with the
    /// same capacity returns the live counter unchanged, and any other
    /// capacity fails with [`GuardError::InvalidRequest`]. `counter.selected`
    /// only seeds a new course.
    pub async fn register_course(
        &self,
        counter: EnrollmentCounter,
        lock_ttl: Duration,
    ) -> Result<Registration> {
        if counter.selected > counter.capacity {
            return Err(GuardError::InvalidRequest(
                "Selected count cannot exceed capacity".to_string(),
            ));
        }

        let resource_id = counter.resource_id;
        let registration = self
            .under_course_lock(resource_id, "registrar", lock_ttl, async {
                match self.ledger.load(resource_id).await? {
                    Some(existing) if existing.capacity == counter.capacity => {
                        Ok(Registration::Existing(existing))
                    }
                    Some(existing) => Err(GuardError::InvalidRequest(format!(
                        "capacity of course {resource_id} is fixed at {}",
                        existing.capacity
                    ))),
                    None if self.ledger.create(counter).await? => {
                        Ok(Registration::Created(counter))
                    }
                    None => Err(GuardError::InvalidRequest(format!(
                        "course {resource_id} registered concurrently"
                    ))),
                }
            })
            .await?
            .unwrap_or(Registration::Contended);

        info!(resource_id, ?registration, "course registration decided");
        Ok(registration)
    }

    /// Current counter straight from the ledger, without locking.
    pub async fn counter(&self, resource_id: u64) -> Result<EnrollmentCounter> {
        self.ledger
            .load(resource_id)
            .await?
            .ok_or_else(|| GuardError::NotFound(format!("course {resource_id}")))
    }

    /// Runs `decide` on the course counter with the course lock held and
    /// persists the new selected count it returns, if any.
    async fn with_course_lock<F>(
        &self,
        resource_id: u64,
        caller_id: u64,
        lock_ttl: Duration,
        decide: F,
    ) -> Result<Locked>
    where
        F: FnOnce(&EnrollmentCounter) -> Option<u32>,
    {
        let owner = format!("student-{caller_id}");
        let locked = self
            .under_course_lock(
                resource_id,
                &owner,
                lock_ttl,
                self.update_locked(resource_id, decide),
            )
            .await?;
        Ok(locked.unwrap_or(Locked::Contended))
    }

    /// Runs `critical` holding the course's seat lock, or returns None
    /// without running it if the lock is taken. The lock is released on
    /// every path; an error from `critical` wins over a release error.
    async fn under_course_lock<R, Fut>(
        &self,
        resource_id: u64,
        owner: &str,
        lock_ttl: Duration,
        critical: Fut,
    ) -> Result<Option<R>>
    where
        Fut: Future<Output = Result<R>>,
    {
        let key = seat_lock_key(resource_id);
        let token = HolderToken::generate(owner);

        if !self.lock.acquire(&key, &token, lock_ttl).await? {
            debug!(resource_id, owner, "course lock busy");
            return Ok(None);
        }

        let result = critical.await;
        let released = self.lock.release(&key, &token).await;

        let value = result?;
        released?;
        Ok(Some(value))
    }

    async fn update_locked<F>(&self, resource_id: u64, decide: F) -> Result<Locked>
    where
        F: FnOnce(&EnrollmentCounter) -> Option<u32>,
    {
        let mut counter = self.counter(resource_id).await?;

        match decide(&counter) {
            Some(selected) => {
                self.ledger.store_selected(resource_id, selected).await?;
                counter.selected = selected;
                Ok(Locked::Updated(counter))
            }
            None => Ok(Locked::Unchanged(counter)),
        }
    }

    /// Best effort: the ledger already holds the committed decision.
    async fn adjust_tally(&self, resource_id: u64, delta: i64) {
        let key = enrollment_tally_key(resource_id);
        match self.store.incr_by(&key, delta).await {
            Ok(tally) => debug!(resource_id, tally, "enrollment tally updated"),
            Err(err) => warn!(resource_id, error = %err, "enrollment tally not updated"),
        }
    }
}

enum Locked {
    Contended,
    Unchanged(EnrollmentCounter),
    Updated(EnrollmentCounter),
}
