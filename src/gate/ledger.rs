//! Seat Ledger
//!
//! Durable-store side of the capacity gate: where each course's capacity
//! and selected count live. The gate only mutates a counter while holding
//! that course's lock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{GuardError, Result};

// == Enrollment Counter ==
/// Capacity and current selection count of one course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentCounter {
    pub resource_id: u64,
    /// Fixed when the course is created
    pub capacity: u32,
    pub selected: u32,
}

impl EnrollmentCounter {
    pub fn new(resource_id: u64, capacity: u32) -> Self {
        Self {
            resource_id,
            capacity,
            selected: 0,
        }
    }

    pub fn has_room(&self) -> bool {
        self.selected < self.capacity
    }

    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.selected)
    }
}

// == Seat Ledger Trait ==
/// Durable storage for enrollment counters.
#[async_trait]
pub trait SeatLedger: Send + Sync {
    /// Current counter for a course, or None if the course does not exist.
    async fn load(&self, resource_id: u64) -> Result<Option<EnrollmentCounter>>;

    /// Persists a new selected count.
    async fn store_selected(&self, resource_id: u64, selected: u32) -> Result<()>;

    /// Adds a course unless one with the same id exists. Returns whether it
    /// was added.
    async fn create(&self, counter: EnrollmentCounter) -> Result<bool>;
}

// == Memory Ledger ==
/// In-memory ledger with an optional per-call delay standing in for
/// database round trips.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    counters: RwLock<HashMap<u64, EnrollmentCounter>>,
    io_delay: Duration,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delay` before every load and store.
    pub fn with_io_delay(mut self, delay: Duration) -> Self {
        self.io_delay = delay;
        self
    }

    /// Seeds a counter directly, replacing any existing one. Only for setup
    /// before admissions start; live registration goes through
    /// [`CapacityGate::register_course`](super::CapacityGate::register_course).
    pub async fn insert(&self, counter: EnrollmentCounter) {
        self.counters
            .write()
            .await
            .insert(counter.resource_id, counter);
    }

    async fn simulate_io(&self) {
        if !self.io_delay.is_zero() {
            tokio::time::sleep(self.io_delay).await;
        }
    }
}

#[async_trait]
impl SeatLedger for MemoryLedger {
    async fn load(&self, resource_id: u64) -> Result<Option<EnrollmentCounter>> {
        self.simulate_io().await;
        Ok(self.counters.read().await.get(&resource_id).copied())
    }

    async fn store_selected(&self, resource_id: u64, selected: u32) -> Result<()> {
        self.simulate_io().await;
        let mut counters = self.counters.write().await;
        let counter = counters
            .get_mut(&resource_id)
            .ok_or_else(|| GuardError::NotFound(format!("course {resource_id}")))?;
        counter.selected = selected;
        Ok(())
    }

    async fn create(&self, counter: EnrollmentCounter) -> Result<bool> {
        self.simulate_io().await;
        let mut counters = self.counters.write().await;
        if counters.contains_key(&counter.resource_id) {
            return Ok(false);
        }
        counters.insert(counter.resource_id, counter);
        Ok(true)
    }
}
