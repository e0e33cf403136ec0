//! API route definitions
//!
//! Everything is mounted under `/api/v1`:
//! - status, health, metrics
//! - buffer view and display controls
//! - connection mode, toggle, ping and latency test
//! - signal parameters and device commands
//! - sequence playback and session recording

use axum::{routing::{get, post}, Router};

use super::handlers::{self, DashboardState};

pub fn api_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/status", get(handlers::get_status))
        .route("/metrics", get(handlers::get_metrics))
        // Buffer
        .route("/buffer", get(handlers::get_buffer))
        .route("/buffer/freeze", post(handlers::toggle_freeze))
        .route("/buffer/clear", post(handlers::clear_buffer))
        .route("/buffer/snapshot", post(handlers::toggle_snapshot))
        .route("/buffer/window", post(handlers::set_window))
        .route("/buffer/gain", post(handlers::set_gain))
        // Connection
        .route("/connection", get(handlers::get_connection))
        .route("/connection/mode", post(handlers::set_mode))
        .route("/connection/toggle", post(handlers::toggle_connection))
        .route("/connection/ping", post(handlers::ping))
        .route("/latency-test/start", post(handlers::start_latency_test))
        .route("/latency-test/stop", post(handlers::stop_latency_test))
        // Parameters
        .route("/params", get(handlers::get_params).post(handlers::update_params))
        .route("/params/send", post(handlers::send_params))
        .route("/params/stop", post(handlers::stop_params))
        // Sequences
        .route("/sequence/play", post(handlers::play_sequence))
        .route("/sequence/pause", post(handlers::pause_sequence))
        .route("/sequence/stop", post(handlers::stop_sequence))
        .route("/sequence/device/sync", post(handlers::sync_sequence))
        .route("/sequence/device/play", post(handlers::play_on_device))
        .route("/sequence/device/stop", post(handlers::stop_on_device))
        // Recording
        .route("/recording/toggle", post(handlers::toggle_recording))
        .route("/recordings", get(handlers::get_recordings))
        .with_state(state)
}
