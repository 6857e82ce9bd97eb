//! Response DTOs for the operator API

use serde::Serialize;

use crate::cache::LoaderStatsSnapshot;
use crate::gate::SeatOutcome;
use crate::store::StoreStats;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `UP` or `DOWN`
    pub status: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn up() -> Self {
        Self {
            status: "UP".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            error: None,
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            status: "DOWN".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            error: Some(error.into()),
        }
    }
}

/// Body of `GET /stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub store: StoreStats,
    /// Store hits / (hits + misses)
    pub hit_rate: f64,
    pub loader: LoaderStatsSnapshot,
}

impl StatsResponse {
    pub fn new(store: StoreStats, loader: LoaderStatsSnapshot) -> Self {
        Self {
            hit_rate: store.hit_rate(),
            store,
            loader,
        }
    }
}

/// Body of the seat endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SeatResponse {
    pub resource_id: u64,
    pub caller_id: u64,
    #[serde(flatten)]
    pub outcome: SeatOutcome,
}
