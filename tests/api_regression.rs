//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the /api/v1/* endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port.

use tremor_monitor::api::{create_app, DashboardState};
use tremor_monitor::config::EngineConfig;
use tremor_monitor::link::{LoopbackTransport, UnavailableTransport};
use tremor_monitor::pipeline::Engine;
use tremor_monitor::types::ConnectionMode;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_state() -> DashboardState {
    Engine::new(EngineConfig::default(), Arc::new(UnavailableTransport)).handles()
}

fn peripheral_state() -> (DashboardState, LoopbackTransport) {
    let mut config = EngineConfig::default();
    config.connection.mode = ConnectionMode::Peripheral;
    let device = LoopbackTransport::new(&config.peripheral);
    let handles = Engine::new(config, Arc::new(device.clone())).handles();
    (handles, device)
}

async fn request(
    state: &DashboardState,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let app = create_app(state.clone());
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// All v1 GET endpoints should return 200 with the envelope.
#[tokio::test]
async fn test_v1_get_endpoints_return_200() {
    let state = create_test_state();
    let endpoints = [
        "/api/v1/health",
        "/api/v1/status",
        "/api/v1/metrics",
        "/api/v1/buffer",
        "/api/v1/connection",
        "/api/v1/params",
        "/api/v1/recordings",
    ];

    for uri in endpoints {
        let (status, json) = request(&state, "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK, "GET {uri}");
        assert!(json.get("data").is_some(), "GET {uri} missing data");
        assert_eq!(json["meta"]["version"], "1", "GET {uri} meta");
    }
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let state = create_test_state();
    let (status, _) = request(&state, "GET", "/api/v1/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mode_switch_round_trip() {
    let state = create_test_state();
    let (status, json) = request(
        &state,
        "POST",
        "/api/v1/connection/mode",
        Some(serde_json::json!({"mode": "cable-stub"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["mode"], "cable-stub");
    assert_eq!(json["data"]["status"], "disconnected");

    let (_, json) = request(&state, "POST", "/api/v1/connection/toggle", None).await;
    assert!(json["data"]["outcome"]["refused"]["reason"].is_string());
}

#[tokio::test]
async fn test_buffer_controls() {
    let state = create_test_state();

    let (status, json) = request(
        &state,
        "POST",
        "/api/v1/buffer/window",
        Some(serde_json::json!({"seconds": 2.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["capacity"], 120);
    assert_eq!(json["data"]["samples"].as_array().map(Vec::len), Some(120));

    let (_, json) = request(&state, "POST", "/api/v1/buffer/snapshot", None).await;
    assert_eq!(json["data"]["enabled"], true);
    let (_, json) = request(&state, "GET", "/api/v1/buffer", None).await;
    assert!(json["data"]["snapshot"].is_array());

    let (_, json) = request(&state, "POST", "/api/v1/buffer/clear", None).await;
    let samples = json["data"]["samples"].as_array().cloned().unwrap_or_default();
    assert_eq!(samples.len(), 120);
    assert!(samples.iter().all(|s| s.as_f64() == Some(0.0)));

    let (status, json) = request(
        &state,
        "POST",
        "/api/v1/buffer/gain",
        Some(serde_json::json!({"gain": 2.5, "auto_scale": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["gain"], 2.5);
    assert_eq!(json["data"]["auto_scale"], false);
}

#[tokio::test]
async fn test_recording_toggle_produces_session() {
    let state = create_test_state();
    let (_, json) = request(&state, "POST", "/api/v1/recording/toggle", None).await;
    assert_eq!(json["data"]["recording"], true);

    let (_, json) = request(&state, "POST", "/api/v1/recording/toggle", None).await;
    assert_eq!(json["data"]["recording"], false);
    assert_eq!(json["data"]["finished"]["duration_sec"], 1);

    let (_, json) = request(&state, "GET", "/api/v1/recordings", None).await;
    assert_eq!(json["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_peripheral_connect_and_latency_test() {
    let (state, device) = peripheral_state();

    let (_, json) = request(&state, "POST", "/api/v1/connection/toggle", None).await;
    assert_eq!(json["data"]["outcome"]["connected"]["streaming"], true);
    assert!(device.is_connected());

    let (status, json) = request(&state, "POST", "/api/v1/latency-test/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["latency_test"]["active"], true);

    let (_, json) = request(&state, "POST", "/api/v1/latency-test/stop", None).await;
    assert_eq!(json["data"]["latency_test"]["active"], false);

    let (_, json) = request(&state, "POST", "/api/v1/params/send", None).await;
    assert_eq!(json["data"]["outcome"], "sent");
}

#[tokio::test]
async fn test_device_sequence_refused_outside_peripheral_mode() {
    let state = create_test_state();
    let (status, json) = request(&state, "POST", "/api/v1/sequence/device/stop", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_local_sequence_playback_applies_first_step() {
    let state = create_test_state();
    let sequence = serde_json::json!({
        "id": "seq-1",
        "name": "Ramp",
        "steps": [
            {"duration": 2.0, "freq": 8.0, "amp": 30.0, "noise": 5.0},
            {"duration": 2.0, "freq": 6.0, "amp": 60.0, "noise": 5.0}
        ]
    });
    let (status, json) = request(&state, "POST", "/api/v1/sequence/play", Some(sequence)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["playing"], true);
    assert_eq!(state.params.read().frequency, 8.0);

    let (_, json) = request(&state, "POST", "/api/v1/sequence/stop", None).await;
    assert_eq!(json["data"]["playing"], false);
}
