//! Acquisition Pipeline Scenario Tests
//!
//! Drives the frame driver and feature scheduler together the way the engine
//! does, on a manual clock, and asserts on the published feature vector.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use tremor_monitor::acquisition::{PeripheralFeed, SampleBuffer, SyntheticSampleSource};
use tremor_monitor::config::AnalysisConfig;
use tremor_monitor::pipeline::{AcquisitionOrchestrator, FeatureExtractionScheduler, MetricsSnapshot};
use tremor_monitor::types::{ConnectionMode, ConnectionState, SignalParams};
use tremor_monitor::Shared;

struct Pipeline {
    orchestrator: AcquisitionOrchestrator,
    scheduler: FeatureExtractionScheduler,
    buffer: Shared<SampleBuffer>,
    metrics: Shared<MetricsSnapshot>,
    _feed: mpsc::Sender<f64>,
}

fn pipeline(params: SignalParams) -> Pipeline {
    let buffer = Shared::new("buffer", SampleBuffer::empty(60.0, 5.0));
    let params = Shared::new("params", params);
    let metrics = Shared::new("metrics", MetricsSnapshot::default());
    let connection = Shared::new("connection", ConnectionState::new(ConnectionMode::Simulated));
    let (tx, rx) = mpsc::channel(16);

    let orchestrator = AcquisitionOrchestrator::with_source(
        buffer.clone(),
        params.clone(),
        connection,
        PeripheralFeed::new(rx),
        SyntheticSampleSource::seeded(7),
    );
    let scheduler =
        FeatureExtractionScheduler::new(buffer.clone(), params, metrics.clone(), AnalysisConfig::default());
    Pipeline { orchestrator, scheduler, buffer, metrics, _feed: tx }
}

/// Run `frames` frames at 60 Hz, analysing every 30 frames.
fn run_frames(p: &mut Pipeline, frames: u32) {
    let start = Instant::now();
    let frame = Duration::from_secs_f64(1.0 / 60.0);
    for i in 0..frames {
        p.orchestrator.tick(start + frame * i);
        if (i + 1) % 30 == 0 {
            p.scheduler.tick();
        }
    }
}

#[test]
fn clean_five_hz_signal_is_detected_after_warmup() {
    let mut p = pipeline(SignalParams {
        frequency: 5.0,
        amplitude: 40.0,
        noise: 0.0,
        enabled: true,
    });

    run_frames(&mut p, 300);
    assert_eq!(p.buffer.read().len(), 300);

    let snapshot = p.metrics.snapshot();
    assert_eq!(snapshot.analyses, 10);
    let m = snapshot.metrics;
    assert!(m.dominant_frequency_hz > 0.0, "dominant frequency should be found");
    assert!(
        (m.dominant_frequency_hz - 5.0).abs() < 0.5,
        "expected ~5 Hz, got {}",
        m.dominant_frequency_hz
    );
    assert!(m.rms_amplitude > 20.0);
    assert!(m.peak_to_peak > 60.0);
    assert!(m.severity_score >= 1);
}

#[test]
fn short_buffer_reports_no_dominant_frequency() {
    let mut p = pipeline(SignalParams::default());
    run_frames(&mut p, 120);
    assert!(p.buffer.read().len() < 256);
    assert_eq!(p.metrics.read().metrics.dominant_frequency_hz, 0.0);
}

#[test]
fn disabled_output_reads_as_silence() {
    let mut p = pipeline(SignalParams {
        frequency: 6.0,
        amplitude: 80.0,
        noise: 0.0,
        enabled: false,
    });
    run_frames(&mut p, 300);
    let m = p.metrics.read().metrics;
    assert_eq!(m.rms_amplitude, 0.0);
    assert_eq!(m.severity_score, 0);
}

#[test]
fn frozen_buffer_keeps_contents_while_frames_run() {
    let mut p = pipeline(SignalParams::default());
    run_frames(&mut p, 60);
    let before = p.buffer.read().to_vec();

    p.buffer.write().freeze();
    run_frames(&mut p, 60);
    assert_eq!(p.buffer.read().to_vec(), before);
}
