//! In-process scenario tests for spk-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket and
//! drive it via `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use spk_daemon::{routes, state};
use spk_db::MemStore;
use spk_engine::EngineConfig;
use spk_registry::{ManualClock, SpaceRegistry};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_router(clock: Arc<ManualClock>) -> axum::Router {
    let registry = SpaceRegistry::in_memory(Arc::new(MemStore::new()), EngineConfig::default());
    let st = Arc::new(state::AppState::new(registry, clock));
    routes::build_router(st)
}

async fn call(router: &axum::Router, req: Request<axum::body::Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("body is not valid JSON")
    };
    (status, json)
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

async fn sensor(router: &axum::Router, node: &str, status: &str, distance: f64) -> Value {
    let (code, body) = call(
        router,
        post_json(
            "/api/node/update",
            json!({
                "node_id": node,
                "sensor_status": status,
                "distance_cm": distance,
                "timestamp": 12345,
            }),
        ),
    )
    .await;
    assert_eq!(code, StatusCode::OK, "{body}");
    body
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let router = make_router(Arc::new(ManualClock::new(0)));
    let (status, json) = call(&router, get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "spk-daemon");
}

#[tokio::test]
async fn sensor_update_creates_space_and_ignores_device_timestamp() {
    let clock = Arc::new(ManualClock::new(1_000));
    let router = make_router(clock);

    let body = sensor(&router, "A1", "OCCUPIED", 12.5).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["final_status"], "OCCUPIED");
    assert_eq!(body["space"]["last_update"], 1_000);
    assert_eq!(body["space"]["version"], 1);

    let (status, json) = call(&router, get("/api/parking/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["A1"]["final_status"], "OCCUPIED");
    assert_eq!(json["A1"]["distance_cm"], 12.5);
    assert_eq!(json["A1"]["last_update_readable"], "1970-01-01 00:16:40 UTC");
}

#[tokio::test]
async fn negative_distance_is_400() {
    let router = make_router(Arc::new(ManualClock::new(1_000)));
    let (status, json) = call(
        &router,
        post_json(
            "/api/node/update",
            json!({"node_id": "A1", "sensor_status": "FREE", "distance_cm": -3.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("INVALID_READING"));
}

#[tokio::test]
async fn reserve_checkin_violation_flow() {
    let clock = Arc::new(ManualClock::new(1_000));
    let router = make_router(clock.clone());
    sensor(&router, "A1", "FREE", 200.0).await;

    let (status, json) = call(
        &router,
        post_json("/api/reserve", json!({"node_id": "A1", "reserved": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = json["qr_token"].as_str().unwrap().to_string();
    assert_eq!(json["expires_at"], 1_030);
    assert_eq!(json["space"]["final_status"], "RESERVED");

    // Someone parks without checking in.
    clock.set(1_005);
    sensor(&router, "A1", "OCCUPIED", 15.0).await;
    let (_, json) = call(&router, get("/api/parking/status/A1")).await;
    assert_eq!(json["final_status"], "VIOLATION");
    assert_eq!(json["violation"], true);

    // Wrong token.
    let (status, json) = call(
        &router,
        post_json("/api/checkin", json!({"node_id": "A1", "qr_token": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(json["error"].as_str().unwrap().starts_with("INVALID_TOKEN"));

    let (status, json) = call(
        &router,
        post_json("/api/checkin", json!({"node_id": "A1", "qr_token": token})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["space"]["final_status"], "RESERVED");
    assert_eq!(json["space"]["violation"], false);

    let (status, _) = call(
        &router,
        post_json("/api/checkin", json!({"node_id": "A1", "qr_token": token})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Expired: the token is stale and the space is just occupied.
    clock.set(1_031);
    let (status, json) = call(
        &router,
        post_json("/api/checkin", json!({"node_id": "A1", "qr_token": token})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().starts_with("NOT_FOUND"));

    let (_, json) = call(&router, get("/api/parking/status/A1")).await;
    assert_eq!(json["final_status"], "OCCUPIED");
    assert!(json["qr_token"].is_null());
}

#[tokio::test]
async fn unknown_node_is_404() {
    let router = make_router(Arc::new(ManualClock::new(0)));
    for req in [
        post_json("/api/reserve", json!({"node_id": "Z9", "reserved": true})),
        post_json("/api/checkin", json!({"node_id": "Z9", "qr_token": "x"})),
        post_empty("/api/admin/maintenance/Z9"),
        post_empty("/api/admin/resume/Z9"),
        get("/api/parking/status/Z9"),
    ] {
        let (status, json) = call(&router, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "NOT_FOUND: unknown node Z9");
    }
}

#[tokio::test]
async fn maintenance_blocks_reservation() {
    let router = make_router(Arc::new(ManualClock::new(10)));
    sensor(&router, "B2", "FREE", 180.0).await;

    let (status, json) = call(&router, post_empty("/api/admin/maintenance/B2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["space"]["final_status"], "MAINTENANCE");

    let (status, json) = call(
        &router,
        post_json("/api/reserve", json!({"node_id": "B2", "reserved": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("PRECONDITION_FAILED"));

    let (status, json) = call(&router, post_empty("/api/admin/resume/B2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["space"]["final_status"], "FREE");
}

#[tokio::test]
async fn analytics_endpoints_report_sessions() {
    let clock = Arc::new(ManualClock::new(1_000));
    let router = make_router(clock.clone());

    sensor(&router, "A1", "OCCUPIED", 10.0).await;
    clock.set(1_060);
    sensor(&router, "A1", "FREE", 200.0).await;
    sensor(&router, "A2", "OCCUPIED", 10.0).await;
    clock.set(1_090);
    sensor(&router, "A2", "FREE", 200.0).await;

    let (status, json) = call(&router, get("/api/admin/analytics/summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_sessions"], 2);
    assert_eq!(json["total_time_seconds"], 90);
    assert_eq!(json["average_time_seconds"], 45.0);

    let (_, json) = call(&router, get("/api/admin/analytics/usage-by-node?range=all")).await;
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["node_id"], "A1");
    assert_eq!(rows[0]["total_time_seconds"], 60);

    let (_, json) = call(
        &router,
        get("/api/admin/analytics/recent-sessions?limit=1&range=today"),
    )
    .await;
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["node_id"], "A2");
    assert_eq!(rows[0]["duration_seconds"], 30);

    let (status, json) = call(&router, get("/api/admin/analytics/summary?range=month")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("BAD_REQUEST"));
}
