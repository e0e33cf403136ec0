//! Composition root.
//!
//! Builds every shared handle once from [`EngineConfig`] and wires them into
//! the link backends, controls and background tasks. Nothing is global:
//! components receive exactly the handles they use.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::connection::ConnectionController;
use super::orchestrator::AcquisitionOrchestrator;
use super::params::ParamsControl;
use super::recorder::SessionRecorder;
use super::scheduler::{FeatureExtractionScheduler, MetricsSnapshot};
use super::sequence::SequencePlayer;
use super::state::{EngineStatus, SystemStatus};
use crate::acquisition::{PeripheralFeed, SampleBuffer};
use crate::config::EngineConfig;
use crate::link::{PeripheralLinkSession, PeripheralTransport, SimulatedLink, StubLink};
use crate::shared::Shared;
use crate::types::{ConnectionState, SignalParams};

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskName {
    HttpServer,
    FrameDriver,
    FeatureScheduler,
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::FrameDriver => write!(f, "FrameDriver"),
            TaskName::FeatureScheduler => write!(f, "FeatureScheduler"),
        }
    }
}

// ============================================================================
// Shared Handles
// ============================================================================

/// Cloneable bundle of everything the API and tests touch.
#[derive(Clone)]
pub struct EngineHandles {
    pub config: Arc<EngineConfig>,
    pub buffer: Shared<SampleBuffer>,
    pub params: Shared<SignalParams>,
    pub metrics: Shared<MetricsSnapshot>,
    pub connection: Shared<ConnectionState>,
    pub controller: ConnectionController,
    pub params_control: ParamsControl,
    pub player: SequencePlayer,
    pub recorder: SessionRecorder,
    pub started_at: Instant,
}

impl EngineHandles {
    pub fn status(&self) -> EngineStatus {
        let (buffer_len, buffer_capacity, sample_rate, frozen) = {
            let b = self.buffer.read();
            (b.len(), b.capacity(), b.sample_rate(), b.is_frozen())
        };
        let (mode, link_status, streaming) = {
            let c = self.connection.read();
            (c.mode, c.status, c.is_streaming())
        };
        EngineStatus {
            system: SystemStatus::derive(frozen, streaming),
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: self.started_at.elapsed().as_secs(),
            mode,
            link_status,
            params: *self.params.read(),
            analyses: self.metrics.read().analyses,
            buffer_len,
            buffer_capacity,
            sample_rate,
            recording: self.recorder.status(),
            playback: self.player.state(),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct Engine {
    handles: EngineHandles,
    orchestrator: AcquisitionOrchestrator,
    scheduler: FeatureExtractionScheduler,
}

impl Engine {
    pub fn new(config: EngineConfig, transport: Arc<dyn PeripheralTransport>) -> Self {
        let acq = &config.acquisition;
        let buffer = if acq.prefill_buffer {
            SampleBuffer::new(acq.frame_rate_hz, acq.window_seconds)
        } else {
            SampleBuffer::empty(acq.frame_rate_hz, acq.window_seconds)
        };
        let buffer = Shared::new("buffer", buffer);
        let params = Shared::new("params", config.signal.clamped());
        let metrics = Shared::new("metrics", MetricsSnapshot::default());
        let connection = Shared::new("connection", ConnectionState::new(config.connection.mode));

        let (samples_tx, samples_rx) = mpsc::channel(acq.telemetry_channel_capacity.max(1));
        let session = PeripheralLinkSession::new(
            transport,
            connection.clone(),
            config.peripheral.clone(),
            config.latency.clone(),
            samples_tx,
        );
        let simulated = SimulatedLink::new(
            connection.clone(),
            config.simulated_link.clone(),
            session.event_sender(),
        );
        let stub = StubLink::new(connection.clone(), session.event_sender());
        let controller = ConnectionController::new(
            connection.clone(),
            session.clone(),
            simulated,
            stub,
            config.latency.clone(),
        );
        let params_control = ParamsControl::new(params.clone(), session.clone());
        let player = SequencePlayer::new(params_control.clone(), session);
        let recorder = SessionRecorder::new(buffer.clone());

        let orchestrator = AcquisitionOrchestrator::new(
            buffer.clone(),
            params.clone(),
            connection.clone(),
            PeripheralFeed::new(samples_rx),
        );
        let scheduler = FeatureExtractionScheduler::new(
            buffer.clone(),
            params.clone(),
            metrics.clone(),
            config.analysis.clone(),
        );

        Self {
            handles: EngineHandles {
                config: Arc::new(config),
                buffer,
                params,
                metrics,
                connection,
                controller,
                params_control,
                player,
                recorder,
                started_at: Instant::now(),
            },
            orchestrator,
            scheduler,
        }
    }

    pub fn handles(&self) -> EngineHandles {
        self.handles.clone()
    }

    /// Spawn the frame driver and feature scheduler into the supervisor's
    /// task set. Returns the shared handles.
    pub fn spawn(
        self,
        task_set: &mut JoinSet<anyhow::Result<TaskName>>,
        cancel: CancellationToken,
    ) -> EngineHandles {
        let frame_rate = self.handles.config.acquisition.frame_rate_hz;
        info!(
            mode = %self.handles.config.connection.mode,
            frame_rate_hz = frame_rate,
            "🚀 Starting acquisition engine"
        );

        let frame_cancel = cancel.clone();
        let orchestrator = self.orchestrator;
        task_set.spawn(async move {
            orchestrator.run(frame_rate, frame_cancel).await;
            Ok(TaskName::FrameDriver)
        });

        let scheduler = self.scheduler;
        task_set.spawn(async move {
            scheduler.run(cancel).await;
            Ok(TaskName::FeatureScheduler)
        });

        self.handles
    }
}
