//! API request handlers
//!
//! Every handler reads or drives the shared engine handles and answers with
//! the `{data, meta}` envelope.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::acquisition::BufferView;
use crate::link::CommandOutcome;
use crate::pipeline::{EngineHandles, ParamsUpdate, RecordedSession};
use crate::types::{ClinicalMetrics, ConnectionMode, IndicatorLevel, MetricKind, Sequence};

/// Handler state: the engine's cloneable handle bundle.
pub type DashboardState = EngineHandles;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct IndicatorReading {
    pub kind: MetricKind,
    pub value: f64,
    pub level: IndicatorLevel,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub metrics: ClinicalMetrics,
    pub indicators: Vec<IndicatorReading>,
    pub analyses: u64,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<CommandOutcome> for CommandResponse {
    fn from(outcome: CommandOutcome) -> Self {
        match outcome {
            CommandOutcome::Sent => Self { outcome: "sent", reason: None },
            CommandOutcome::Skipped => Self { outcome: "skipped", reason: None },
            CommandOutcome::Failed(reason) => Self {
                outcome: "failed",
                reason: Some(reason),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub latency_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct RecordingToggleResponse {
    pub recording: bool,
    pub finished: Option<RecordedSession>,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct WindowRequest {
    pub seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct GainRequest {
    pub gain: Option<f64>,
    pub auto_scale: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DevicePlayRequest {
    pub id: String,
}

// ============================================================================
// Status
// ============================================================================

/// GET /api/v1/health
pub async fn get_health(State(state): State<DashboardState>) -> Response {
    ApiResponse::ok(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<DashboardState>) -> Response {
    ApiResponse::ok(state.status())
}

/// GET /api/v1/metrics
///
/// Latest metrics vector with each readout classified against its
/// configured band.
pub async fn get_metrics(State(state): State<DashboardState>) -> Response {
    let snapshot = state.metrics.snapshot();
    let bands = &state.config.indicators;
    let indicators = MetricKind::ALL
        .iter()
        .map(|&kind| {
            let value = snapshot.metrics.value(kind);
            IndicatorReading {
                kind,
                value,
                level: bands.band(kind).classify(value),
            }
        })
        .collect();

    ApiResponse::ok(MetricsResponse {
        metrics: snapshot.metrics,
        indicators,
        analyses: snapshot.analyses,
        updated_at: snapshot.updated_at,
    })
}

// ============================================================================
// Buffer
// ============================================================================

fn buffer_view(state: &DashboardState) -> BufferView {
    state.buffer.read().view()
}

/// GET /api/v1/buffer
pub async fn get_buffer(State(state): State<DashboardState>) -> Response {
    ApiResponse::ok(buffer_view(&state))
}

/// POST /api/v1/buffer/freeze
pub async fn toggle_freeze(State(state): State<DashboardState>) -> Response {
    let frozen = state.buffer.write().toggle_freeze();
    info!(frozen, "❄️ Display freeze toggled");
    ApiResponse::ok(ToggleResponse { enabled: frozen })
}

/// POST /api/v1/buffer/clear
pub async fn clear_buffer(State(state): State<DashboardState>) -> Response {
    state.buffer.write().clear();
    ApiResponse::ok(buffer_view(&state))
}

/// POST /api/v1/buffer/snapshot
pub async fn toggle_snapshot(State(state): State<DashboardState>) -> Response {
    let captured = state.buffer.write().toggle_snapshot();
    ApiResponse::ok(ToggleResponse { enabled: captured })
}

/// POST /api/v1/buffer/window
pub async fn set_window(
    State(state): State<DashboardState>,
    Json(req): Json<WindowRequest>,
) -> Response {
    if !req.seconds.is_finite() || req.seconds <= 0.0 {
        return ApiErrorResponse::bad_request("window seconds must be positive");
    }
    state.buffer.write().set_window_seconds(req.seconds);
    ApiResponse::ok(buffer_view(&state))
}

/// POST /api/v1/buffer/gain
pub async fn set_gain(
    State(state): State<DashboardState>,
    Json(req): Json<GainRequest>,
) -> Response {
    if let Some(gain) = req.gain {
        if !gain.is_finite() || gain <= 0.0 {
            return ApiErrorResponse::bad_request("gain must be positive");
        }
    }
    {
        let mut buffer = state.buffer.write();
        if let Some(gain) = req.gain {
            buffer.set_gain(gain);
        }
        if let Some(auto) = req.auto_scale {
            buffer.set_auto_scale(auto);
        }
    }
    ApiResponse::ok(buffer_view(&state))
}

// ============================================================================
// Connection
// ============================================================================

/// GET /api/v1/connection
pub async fn get_connection(State(state): State<DashboardState>) -> Response {
    ApiResponse::ok(state.controller.view())
}

/// POST /api/v1/connection/mode
pub async fn set_mode(
    State(state): State<DashboardState>,
    Json(req): Json<ModeRequest>,
) -> Response {
    let mode: ConnectionMode = match req.mode.parse() {
        Ok(mode) => mode,
        Err(e) => return ApiErrorResponse::bad_request(e),
    };
    state.controller.set_mode(mode).await;
    ApiResponse::ok(state.controller.view())
}

/// POST /api/v1/connection/toggle
pub async fn toggle_connection(State(state): State<DashboardState>) -> Response {
    let outcome = state.controller.connect_toggle().await;
    debug!(?outcome, "Connection toggle");
    ApiResponse::ok(serde_json::json!({
        "outcome": outcome,
        "connection": state.controller.view(),
    }))
}

/// POST /api/v1/connection/ping
pub async fn ping(State(state): State<DashboardState>) -> Response {
    let latency_ms = state.controller.ping().await;
    ApiResponse::ok(PingResponse { latency_ms })
}

/// POST /api/v1/latency-test/start
pub async fn start_latency_test(State(state): State<DashboardState>) -> Response {
    match state.controller.start_latency_test() {
        Ok(()) => ApiResponse::ok(state.controller.view()),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/latency-test/stop
pub async fn stop_latency_test(State(state): State<DashboardState>) -> Response {
    state.controller.stop_latency_test();
    ApiResponse::ok(state.controller.view())
}

// ============================================================================
// Parameters
// ============================================================================

/// GET /api/v1/params
pub async fn get_params(State(state): State<DashboardState>) -> Response {
    ApiResponse::ok(state.params_control.view())
}

/// POST /api/v1/params
pub async fn update_params(
    State(state): State<DashboardState>,
    Json(update): Json<ParamsUpdate>,
) -> Response {
    state.params_control.apply(update);
    ApiResponse::ok(state.params_control.view())
}

/// POST /api/v1/params/send
pub async fn send_params(State(state): State<DashboardState>) -> Response {
    ApiResponse::ok(CommandResponse::from(state.params_control.send().await))
}

/// POST /api/v1/params/stop
pub async fn stop_params(State(state): State<DashboardState>) -> Response {
    ApiResponse::ok(CommandResponse::from(state.params_control.stop().await))
}

// ============================================================================
// Sequences
// ============================================================================

/// POST /api/v1/sequence/play
pub async fn play_sequence(
    State(state): State<DashboardState>,
    Json(sequence): Json<Sequence>,
) -> Response {
    if !state.player.play(sequence) {
        return ApiErrorResponse::bad_request("sequence has no steps");
    }
    ApiResponse::ok(state.player.state())
}

/// POST /api/v1/sequence/pause
pub async fn pause_sequence(State(state): State<DashboardState>) -> Response {
    state.player.pause();
    ApiResponse::ok(state.player.state())
}

/// POST /api/v1/sequence/stop
pub async fn stop_sequence(State(state): State<DashboardState>) -> Response {
    state.player.stop();
    ApiResponse::ok(state.player.state())
}

/// POST /api/v1/sequence/device/sync
pub async fn sync_sequence(
    State(state): State<DashboardState>,
    Json(sequence): Json<Sequence>,
) -> Response {
    match state.player.sync_to_device(&sequence).await {
        Ok(outcome) => ApiResponse::ok(CommandResponse::from(outcome)),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/sequence/device/play
pub async fn play_on_device(
    State(state): State<DashboardState>,
    Json(req): Json<DevicePlayRequest>,
) -> Response {
    match state.player.play_on_device(&req.id).await {
        Ok(outcome) => ApiResponse::ok(CommandResponse::from(outcome)),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/sequence/device/stop
pub async fn stop_on_device(State(state): State<DashboardState>) -> Response {
    match state.player.stop_on_device().await {
        Ok(outcome) => ApiResponse::ok(CommandResponse::from(outcome)),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Recording
// ============================================================================

/// POST /api/v1/recording/toggle
pub async fn toggle_recording(State(state): State<DashboardState>) -> Response {
    let finished = state.recorder.toggle();
    ApiResponse::ok(RecordingToggleResponse {
        recording: state.recorder.is_recording(),
        finished,
    })
}

/// GET /api/v1/recordings
pub async fn get_recordings(State(state): State<DashboardState>) -> Response {
    ApiResponse::ok(state.recorder.sessions())
}
