//! Integration Tests for API Endpoints
//!
//! Drives the router end to end with `oneshot`.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use seatguard::{api::create_router, AppState, Config, SharedStore};
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_state() -> AppState {
    AppState::from_config(&Config::default())
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn register_course(app: &Router, id: u64, capacity: u32) {
    let (status, _) = send(
        app,
        "PUT",
        &format!("/courses/{id}"),
        Some(&format!(r#"{{"capacity": {capacity}}}"#)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

// == Health ==

#[tokio::test]
async fn test_health_up() {
    let app = create_router(create_test_state());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "UP");
    assert!(json.get("timestamp").is_some());
}

#[tokio::test]
async fn test_health_down_when_store_offline() {
    let state = create_test_state();
    state.store.set_online(false);
    let app = create_router(state);

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "DOWN");
    assert!(json["error"].as_str().unwrap().contains("unavailable"));
}

// == Seats ==

#[tokio::test]
async fn test_seat_lifecycle() {
    let app = create_router(create_test_state());
    register_course(&app, 3, 1).await;

    let (status, json) = send(&app, "POST", "/courses/3/seats", Some(r#"{"caller_id": 1}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "admitted");
    assert_eq!(json["selected"], 1);
    assert_eq!(json["capacity"], 1);

    let (status, json) = send(&app, "POST", "/courses/3/seats", Some(r#"{"caller_id": 2}"#)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["outcome"], "rejected");
    assert_eq!(json["reason"], "full");

    let (status, json) = send(&app, "DELETE", "/courses/3/seats", Some(r#"{"caller_id": 1}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "released");
    assert_eq!(json["selected"], 0);

    let (status, json) = send(&app, "GET", "/courses/3/seats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["selected"], 0);
    assert_eq!(json["capacity"], 1);
}

#[tokio::test]
async fn test_seat_contended() {
    let state = create_test_state();
    let store = state.store.clone();
    let app = create_router(state);
    register_course(&app, 4, 10).await;
    store
        .set_if_absent("lock:seat:4", "other".into(), Duration::from_secs(10))
        .await
        .unwrap();

    let (status, json) = send(&app, "POST", "/courses/4/seats", Some(r#"{"caller_id": 1}"#)).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["reason"], "contended");
}

#[tokio::test]
async fn test_seat_unknown_course() {
    let app = create_router(create_test_state());

    let (status, json) = send(&app, "POST", "/courses/404/seats", Some(r#"{"caller_id": 1}"#)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("404"));
}

#[tokio::test]
async fn test_seat_store_offline() {
    let state = create_test_state();
    let store = state.store.clone();
    let app = create_router(state);
    register_course(&app, 5, 10).await;
    store.set_online(false);

    let (status, _) = send(&app, "POST", "/courses/5/seats", Some(r#"{"caller_id": 1}"#)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_register_course_invalid() {
    let app = create_router(create_test_state());

    let (status, _) = send(&app, "PUT", "/courses/1", Some(r#"{"capacity": 1, "selected": 3}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_course_capacity_fixed() {
    let app = create_router(create_test_state());
    register_course(&app, 6, 2).await;
    send(&app, "POST", "/courses/6/seats", Some(r#"{"caller_id": 1}"#)).await;

    let (status, json) = send(&app, "PUT", "/courses/6", Some(r#"{"capacity": 2}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["selected"], 1);

    let (status, json) = send(&app, "PUT", "/courses/6", Some(r#"{"capacity": 50}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("fixed at 2"));

    let (_, json) = send(&app, "GET", "/courses/6/seats", None).await;
    assert_eq!(json["capacity"], 2);
    assert_eq!(json["selected"], 1);
}

#[tokio::test]
async fn test_tally_visible_in_store() {
    let state = create_test_state();
    let store = state.store.clone();
    let app = create_router(state);
    register_course(&app, 8, 5).await;

    for caller in 1..=3 {
        send(&app, "POST", "/courses/8/seats", Some(&format!(r#"{{"caller_id": {caller}}}"#))).await;
    }

    assert_eq!(
        store.get("course:8:enrollment").await.unwrap().as_deref(),
        Some("3")
    );
}

// == Drill and Stats ==

#[tokio::test]
async fn test_stampede_drill() {
    let app = create_router(create_test_state());

    let (status, json) = send(
        &app,
        "POST",
        "/drill/stampede",
        Some(r#"{"key": "course:hot", "concurrency": 25, "loader_delay_ms": 50}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["loader_invocations"], 1);
    assert_eq!(json["successes"], 25);
    assert_eq!(json["protected"], true);

    let (status, json) = send(&app, "GET", "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["loader"]["loads"], 1);
    assert!(json["store"]["hits"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_stampede_drill_invalid() {
    let app = create_router(create_test_state());

    let (status, json) = send(
        &app,
        "POST",
        "/drill/stampede",
        Some(r#"{"key": "k", "concurrency": 0}"#),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_invalidate_cached_key() {
    let state = create_test_state();
    state.store.set("profile:1", "\"x\"".into(), None).await.unwrap();
    let app = create_router(state);

    let (status, json) = send(&app, "DELETE", "/cache/profile:1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], true);

    let (_, json) = send(&app, "DELETE", "/cache/profile:1", None).await;
    assert_eq!(json["removed"], false);
}

#[tokio::test]
async fn test_unknown_route() {
    let app = create_router(create_test_state());

    let (status, _) = send(&app, "GET", "/nope", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
