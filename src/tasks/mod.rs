//! Background Tasks
//!
//! - Expiry sweeper: drops expired store keys on an interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;
