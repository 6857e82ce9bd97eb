//! API Routes

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    acquire_seat_handler, drill_handler, health_handler, invalidate_handler, put_course_handler,
    release_seat_handler, seats_handler, stats_handler, AppState,
};

/// Builds the router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/drill/stampede", post(drill_handler))
        .route("/cache/:key", delete(invalidate_handler))
        .route("/courses/:id", put(put_course_handler))
        .route(
            "/courses/:id/seats",
            get(seats_handler)
                .post(acquire_seat_handler)
                .delete(release_seat_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
