//! Error types for the concurrency-control layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Guard Error Enum ==
/// Unified error type for the store, lock, cache and gate.
///
/// A full course is not an error: the gate reports it as
/// [`crate::gate::SeatOutcome::Rejected`].
#[derive(Error, Debug)]
pub enum GuardError {
    /// Lock contention outlasted the retry budget
    #[error("Timed out waiting for lock {key} after {attempts} attempts ({waited_ms}ms)")]
    LockTimeout {
        key: String,
        attempts: u32,
        waited_ms: u64,
    },

    /// The origin loader failed; never retried
    #[error("Loader failed: {0}")]
    Loader(#[source] anyhow::Error),

    /// Shared store could not be reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Cached bytes could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Gate resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid key, value or argument
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl GuardError {
    /// True for failures a caller may reasonably resubmit.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GuardError::LockTimeout { .. } | GuardError::StoreUnavailable(_)
        )
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let status = match &self {
            GuardError::LockTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GuardError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GuardError::NotFound(_) => StatusCode::NOT_FOUND,
            GuardError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GuardError::Loader(_) | GuardError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = GuardError::LockTimeout {
            key: "lock:k".to_string(),
            attempts: 3,
            waited_ms: 300,
        };
        assert!(timeout.is_transient());
        assert!(GuardError::StoreUnavailable("down".into()).is_transient());
        assert!(!GuardError::NotFound("course 1".into()).is_transient());
        assert!(!GuardError::Loader(anyhow::anyhow!("boom")).is_transient());
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                GuardError::LockTimeout {
                    key: "k".into(),
                    attempts: 1,
                    waited_ms: 1,
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                GuardError::StoreUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (GuardError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (GuardError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (
                GuardError::Loader(anyhow::anyhow!("x")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_loader_error_keeps_source() {
        let err = GuardError::Loader(anyhow::anyhow!("db offline"));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("db offline"));
    }
}
