//! API Handlers
//!
//! Thin glue from HTTP onto the store, cache and gate.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::warn;

use crate::cache::StampedeCache;
use crate::config::Config;
use crate::drill::{run_stampede_drill, DrillReport, DEFAULT_LOADER_DELAY};
use crate::error::{GuardError, Result};
use crate::gate::{
    CapacityGate, EnrollmentCounter, MemoryLedger, Registration, RejectReason, SeatOutcome,
};
use crate::models::{
    CourseRequest, DrillRequest, HealthResponse, SeatRequest, SeatResponse, StatsResponse,
};
use crate::store::{MemoryStore, SharedStore};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: MemoryStore,
    pub cache: StampedeCache<MemoryStore>,
    pub gate: CapacityGate<MemoryStore, MemoryLedger>,
    pub ledger: Arc<MemoryLedger>,
    /// Lock TTL handed to the gate on each seat request
    pub lock_ttl: Duration,
    /// Value TTL for drills that do not name one
    pub cache_ttl: Duration,
}

impl AppState {
    pub fn new(store: MemoryStore, ledger: Arc<MemoryLedger>, config: &Config) -> Self {
        let shared = Arc::new(store.clone());
        Self {
            cache: StampedeCache::from_config(Arc::clone(&shared), config),
            gate: CapacityGate::new(shared, Arc::clone(&ledger)),
            store,
            ledger,
            lock_ttl: config.lock_ttl(),
            cache_ttl: config.cache_ttl(),
        }
    }

    /// Builds a fresh store and an empty ledger from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            MemoryStore::from_config(config),
            Arc::new(MemoryLedger::new()),
            config,
        )
    }
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::up())),
        Err(err) => {
            warn!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::down(err.to_string())),
            )
        }
    }
}

/// GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.store.stats().await,
        state.cache.stats(),
    ))
}

/// POST /drill/stampede
pub async fn drill_handler(
    State(state): State<AppState>,
    Json(req): Json<DrillRequest>,
) -> Result<Json<DrillReport>> {
    if let Some(error_msg) = req.validate() {
        return Err(GuardError::InvalidRequest(error_msg));
    }

    let delay = req
        .loader_delay_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_LOADER_DELAY);
    let ttl = req.ttl.map(Duration::from_secs).unwrap_or(state.cache_ttl);
    let report = run_stampede_drill(&state.cache, &req.key, req.concurrency, delay, ttl).await?;

    Ok(Json(report))
}

/// DELETE /cache/:key
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>> {
    let removed = state.cache.invalidate(&key).await?;
    Ok(Json(json!({ "key": key, "removed": removed })))
}

/// PUT /courses/:id
///
/// 201 for a new course, 200 when it already exists with the same capacity,
/// 400 on a capacity change and 429 while a seat request holds the course.
pub async fn put_course_handler(
    State(state): State<AppState>,
    Path(resource_id): Path<u64>,
    Json(req): Json<CourseRequest>,
) -> Result<Response> {
    if let Some(error_msg) = req.validate() {
        return Err(GuardError::InvalidRequest(error_msg));
    }

    let counter = EnrollmentCounter {
        resource_id,
        capacity: req.capacity,
        selected: req.selected,
    };
    let response = match state.gate.register_course(counter, state.lock_ttl).await? {
        Registration::Created(counter) => (StatusCode::CREATED, Json(counter)).into_response(),
        Registration::Existing(counter) => (StatusCode::OK, Json(counter)).into_response(),
        Registration::Contended => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "resource_id": resource_id,
                "error": "course is busy, resubmit",
            })),
        )
            .into_response(),
    };

    Ok(response)
}

/// GET /courses/:id/seats
pub async fn seats_handler(
    State(state): State<AppState>,
    Path(resource_id): Path<u64>,
) -> Result<Json<EnrollmentCounter>> {
    Ok(Json(state.gate.counter(resource_id).await?))
}

/// POST /courses/:id/seats
pub async fn acquire_seat_handler(
    State(state): State<AppState>,
    Path(resource_id): Path<u64>,
    Json(req): Json<SeatRequest>,
) -> Result<(StatusCode, Json<SeatResponse>)> {
    let outcome = state
        .gate
        .try_acquire_seat(resource_id, req.caller_id, state.lock_ttl)
        .await?;
    Ok(seat_reply(resource_id, req.caller_id, outcome))
}

/// DELETE /courses/:id/seats
pub async fn release_seat_handler(
    State(state): State<AppState>,
    Path(resource_id): Path<u64>,
    Json(req): Json<SeatRequest>,
) -> Result<(StatusCode, Json<SeatResponse>)> {
    let outcome = state
        .gate
        .release_seat(resource_id, req.caller_id, state.lock_ttl)
        .await?;
    Ok(seat_reply(resource_id, req.caller_id, outcome))
}

fn seat_reply(
    resource_id: u64,
    caller_id: u64,
    outcome: SeatOutcome,
) -> (StatusCode, Json<SeatResponse>) {
    let status = match outcome {
        SeatOutcome::Admitted { .. } | SeatOutcome::Released { .. } => StatusCode::OK,
        SeatOutcome::Rejected { reason: RejectReason::Contended } => StatusCode::TOO_MANY_REQUESTS,
        SeatOutcome::Rejected { .. } => StatusCode::CONFLICT,
    };
    (
        status,
        Json(SeatResponse {
            resource_id,
            caller_id,
            outcome,
        }),
    )
}
