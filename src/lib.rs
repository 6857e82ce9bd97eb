//! seatguard - concurrency control for a campus course system
//!
//! Distributed locks, a stampede-protected cache and a capacity gate for
//! course enrollment, all over a shared key-value store.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod drill;
pub mod error;
pub mod gate;
pub mod lock;
pub mod models;
pub mod store;
pub mod tasks;

pub use api::AppState;
pub use cache::StampedeCache;
pub use config::Config;
pub use error::{GuardError, Result};
pub use gate::{CapacityGate, SeatOutcome};
pub use lock::DistributedLock;
pub use store::{MemoryStore, SharedStore};
pub use tasks::spawn_cleanup_task;
