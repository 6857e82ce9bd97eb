//! Request DTOs for the operator API

use serde::Deserialize;

use crate::cache::MAX_CACHE_KEY_LENGTH;
use crate::drill::MAX_DRILL_CONCURRENCY;

/// Body of `POST /drill/stampede`.
#[derive(Debug, Clone, Deserialize)]
pub struct DrillRequest {
    pub key: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Simulated origin latency, defaults to 100ms
    #[serde(default)]
    pub loader_delay_ms: Option<u64>,
    /// Lifetime of the loaded value in seconds, defaults to `DEFAULT_TTL`
    #[serde(default)]
    pub ttl: Option<u64>,
}

fn default_concurrency() -> usize {
    10
}

impl DrillRequest {
    /// Returns an error message if the request is unusable.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_CACHE_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {MAX_CACHE_KEY_LENGTH} characters"
            ));
        }
        if self.ttl == Some(0) {
            return Some("TTL must be positive".to_string());
        }
        if self.concurrency == 0 || self.concurrency > MAX_DRILL_CONCURRENCY {
            return Some(format!(
                "Concurrency must be between 1 and {MAX_DRILL_CONCURRENCY}"
            ));
        }
        None
    }
}

/// Body of `POST` and `DELETE /courses/:id/seats`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SeatRequest {
    pub caller_id: u64,
}

/// Body of `PUT /courses/:id`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CourseRequest {
    pub capacity: u32,
    #[serde(default)]
    pub selected: u32,
}

impl CourseRequest {
    pub fn validate(&self) -> Option<String> {
        if self.selected > self.capacity {
            return Some("Selected count cannot exceed capacity".to_string());
        }
        None
    }
}
