//! Link Lifecycle Tests
//!
//! Runs the connection controller against the in-process loopback device:
//! connect, stream telemetry into the frame driver, send commands, measure
//! round trips and survive a peripheral-initiated drop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use tremor_monitor::config::EngineConfig;
use tremor_monitor::link::{CommandOutcome, LoopbackTransport, SessionEvent};
use tremor_monitor::pipeline::{Engine, EngineHandles, ParamsUpdate, SystemStatus, ToggleOutcome};
use tremor_monitor::types::{ConnectionMode, LinkStatus, PeripheralCommand};

fn peripheral_engine() -> (Engine, LoopbackTransport) {
    let mut config = EngineConfig::default();
    config.connection.mode = ConnectionMode::Peripheral;
    config.acquisition.prefill_buffer = false;
    let device = LoopbackTransport::new(&config.peripheral);
    let engine = Engine::new(config, Arc::new(device.clone()));
    (engine, device)
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn connect(handles: &EngineHandles) {
    assert_eq!(
        handles.controller.connect_toggle().await,
        ToggleOutcome::Connected { streaming: true }
    );
}

#[tokio::test]
async fn connect_then_disconnect_round_trip() {
    let (engine, device) = peripheral_engine();
    let handles = engine.handles();
    let mut events = handles.controller.subscribe();

    connect(&handles).await;
    assert!(device.is_connected());
    assert_eq!(handles.status().system, SystemStatus::Streaming);
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::StatusChanged { status: LinkStatus::Connecting }
    );

    assert_eq!(handles.controller.connect_toggle().await, ToggleOutcome::Disconnected);
    let view = handles.controller.view();
    assert_eq!(view.status, LinkStatus::Disconnected);
    assert!(!view.streaming);
    assert!(view.latency_ms.is_none());
}

#[tokio::test]
async fn parameter_commands_reach_the_device() {
    let (engine, device) = peripheral_engine();
    let handles = engine.handles();
    connect(&handles).await;

    handles.params_control.apply(ParamsUpdate {
        frequency: Some(7.0),
        amplitude: Some(25.0),
        ..ParamsUpdate::default()
    });
    assert_eq!(handles.params_control.send().await, CommandOutcome::Sent);
    let on_device = device.device_params();
    assert_eq!(on_device.frequency, 7.0);
    assert_eq!(on_device.amplitude, 25.0);

    assert_eq!(handles.params_control.stop().await, CommandOutcome::Sent);
    assert!(device
        .written_commands()
        .iter()
        .any(|c| matches!(c, PeripheralCommand::Stop)));
    assert!(!handles.params.read().enabled);
}

#[tokio::test]
async fn ping_measures_round_trip() {
    let (engine, device) = peripheral_engine();
    let handles = engine.handles();
    connect(&handles).await;

    let latency = handles.controller.ping().await;
    assert!(latency.is_some());
    assert!(handles.controller.view().latency_ms.is_some());
    assert!(device
        .written_commands()
        .iter()
        .any(|c| matches!(c, PeripheralCommand::Ping { .. })));
}

#[tokio::test]
async fn peripheral_drop_returns_to_disconnected() {
    let (engine, device) = peripheral_engine();
    let handles = engine.handles();
    connect(&handles).await;

    device.drop_link();
    settle().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let view = handles.controller.view();
    assert_eq!(view.status, LinkStatus::Disconnected);
    assert!(view.device.is_none());
    assert_eq!(handles.status().system, SystemStatus::Synthetic);
}

#[tokio::test(start_paused = true)]
async fn streamed_telemetry_lands_in_the_buffer() {
    let (engine, device) = peripheral_engine();
    let mut tasks = JoinSet::new();
    let cancel = CancellationToken::new();
    let handles = engine.spawn(&mut tasks, cancel.clone());
    connect(&handles).await;

    for i in 0..10 {
        assert!(device.notify_json(&json!({ "sample": f64::from(i) })));
    }
    settle().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The driver may have pushed a synthetic sample before the link came up.
    let samples = handles.buffer.read().to_vec();
    assert!(samples.len() >= 10);
    assert_eq!(samples[samples.len() - 10..], (0..10).map(f64::from).collect::<Vec<_>>()[..]);

    cancel.cancel();
    while tasks.join_next().await.is_some() {}
}

#[tokio::test]
async fn cable_stub_refuses_to_connect() {
    let (engine, _device) = peripheral_engine();
    let handles = engine.handles();
    handles.controller.set_mode(ConnectionMode::CableStub).await;

    let outcome = handles.controller.connect_toggle().await;
    assert!(matches!(outcome, ToggleOutcome::Refused { .. }));
    assert_eq!(handles.controller.view().status, LinkStatus::Disconnected);
}
