//! Per-frame acquisition driver.
//!
//! Each frame picks a provider (the peripheral feed while a peripheral is
//! streaming, the synthetic oscillator otherwise), pulls its samples and
//! pushes them into the shared buffer. The sample-rate estimate is an
//! exponentially smoothed inverse of the frame delta.

use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::acquisition::{PeripheralFeed, SampleBuffer, SampleProvider, SyntheticSampleSource};
use crate::config::defaults::SAMPLE_RATE_SMOOTHING;
use crate::shared::Shared;
use crate::types::{ConnectionState, SignalParams};

/// Result of one frame, mostly for tests and trace logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub delta_secs: f64,
    pub pushed: usize,
    /// Peripheral samples drained and thrown away while frozen.
    pub discarded: usize,
    pub from_peripheral: bool,
}

pub struct AcquisitionOrchestrator {
    buffer: Shared<SampleBuffer>,
    params: Shared<SignalParams>,
    connection: Shared<ConnectionState>,
    synthetic: SyntheticSampleSource,
    feed: PeripheralFeed,
    last_frame: Option<Instant>,
    frames: u64,
    scratch: Vec<f64>,
}

impl AcquisitionOrchestrator {
    pub fn new(
        buffer: Shared<SampleBuffer>,
        params: Shared<SignalParams>,
        connection: Shared<ConnectionState>,
        feed: PeripheralFeed,
    ) -> Self {
        Self::with_source(buffer, params, connection, feed, SyntheticSampleSource::new())
    }

    pub fn with_source(
        buffer: Shared<SampleBuffer>,
        params: Shared<SignalParams>,
        connection: Shared<ConnectionState>,
        feed: PeripheralFeed,
        synthetic: SyntheticSampleSource,
    ) -> Self {
        Self {
            buffer,
            params,
            connection,
            synthetic,
            feed,
            last_frame: None,
            frames: 0,
            scratch: Vec::new(),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Run one frame at time `now`.
    pub fn tick(&mut self, now: Instant) -> FrameReport {
        let delta = self
            .last_frame
            .map_or(0.0, |prev| now.saturating_duration_since(prev).as_secs_f64());
        self.last_frame = Some(now);
        self.frames += 1;

        let streaming = self.connection.read().is_streaming();
        let params = *self.params.read();

        let mut buffer = self.buffer.write();
        if delta > 0.0 {
            let rate = SAMPLE_RATE_SMOOTHING * buffer.sample_rate()
                + (1.0 - SAMPLE_RATE_SMOOTHING) / delta;
            buffer.set_sample_rate_estimate(rate);
        }

        if buffer.is_frozen() {
            let discarded = self.feed.discard();
            return FrameReport { delta_secs: delta, pushed: 0, discarded, from_peripheral: streaming };
        }

        self.scratch.clear();
        let provider: &mut dyn SampleProvider = if streaming {
            &mut self.feed
        } else {
            &mut self.synthetic
        };
        provider.pull(delta, &params, &mut self.scratch);
        buffer.extend(self.scratch.iter().copied());

        FrameReport {
            delta_secs: delta,
            pushed: self.scratch.len(),
            discarded: 0,
            from_peripheral: streaming,
        }
    }

    /// Drive frames at `frame_rate_hz` until cancelled.
    pub async fn run(mut self, frame_rate_hz: f64, cancel: CancellationToken) -> u64 {
        let period = Duration::from_secs_f64(1.0 / frame_rate_hz.max(1.0));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(frame_rate_hz, "[FrameDriver] Task starting");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[FrameDriver] Received shutdown signal after {} frames", self.frames);
                    break;
                }
                tick = ticker.tick() => {
                    let report = self.tick(tick.into_std());
                    if self.frames % 600 == 0 {
                        debug!(
                            frames = self.frames,
                            pushed = report.pushed,
                            peripheral = report.from_peripheral,
                            "[FrameDriver] Heartbeat"
                        );
                    }
                }
            }
        }
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelHandle, ConnectionMode, DeviceHandle, LinkHandles, LinkStatus};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct Rig {
        orch: AcquisitionOrchestrator,
        buffer: Shared<SampleBuffer>,
        connection: Shared<ConnectionState>,
        tx: mpsc::Sender<f64>,
    }

    fn rig() -> Rig {
        let buffer = Shared::new("buffer", SampleBuffer::empty(60.0, 5.0));
        let params = Shared::new("params", SignalParams::default());
        let connection = Shared::new("connection", ConnectionState::default());
        let (tx, rx) = mpsc::channel(64);
        let orch = AcquisitionOrchestrator::with_source(
            buffer.clone(),
            params,
            connection.clone(),
            PeripheralFeed::new(rx),
            SyntheticSampleSource::seeded(1),
        );
        Rig { orch, buffer, connection, tx }
    }

    fn stream_peripheral(connection: &Shared<ConnectionState>) {
        let mut st = connection.write();
        st.mode = ConnectionMode::Peripheral;
        st.status = LinkStatus::Connected;
        let ch = ChannelHandle { uuid: Uuid::nil(), notify: true, writable: true };
        st.handles = Some(LinkHandles {
            device: DeviceHandle { id: "d".into(), name: "Tremor".into() },
            control: ch.clone(),
            telemetry: Some(ch),
        });
    }

    #[test]
    fn test_first_frame_has_zero_delta_and_keeps_rate() {
        let mut r = rig();
        let report = r.orch.tick(Instant::now());
        assert_eq!(report.delta_secs, 0.0);
        assert_eq!(report.pushed, 1);
        assert_eq!(r.buffer.read().sample_rate(), 60.0);
    }

    #[test]
    fn test_rate_estimate_smooths_toward_frame_rate() {
        let mut r = rig();
        let start = Instant::now();
        r.orch.tick(start);
        r.orch.tick(start + Duration::from_millis(20));
        // 0.9 * 60 + 0.1 * 50
        assert!((r.buffer.read().sample_rate() - 59.0).abs() < 1e-9);
    }

    #[test]
    fn test_frozen_buffer_discards_peripheral_samples() {
        let mut r = rig();
        stream_peripheral(&r.connection);
        r.buffer.write().freeze();
        r.tx.try_send(1.0).unwrap();
        r.tx.try_send(2.0).unwrap();

        let report = r.orch.tick(Instant::now());
        assert_eq!(report.pushed, 0);
        assert_eq!(report.discarded, 2);
        assert!(r.buffer.read().is_empty());

        // Nothing left over after unfreezing
        r.buffer.write().unfreeze();
        let report = r.orch.tick(Instant::now());
        assert_eq!(report.pushed, 0);
    }

    #[test]
    fn test_streaming_peripheral_replaces_synthetic() {
        let mut r = rig();
        stream_peripheral(&r.connection);
        r.tx.try_send(7.0).unwrap();
        r.tx.try_send(8.0).unwrap();
        r.tx.try_send(9.0).unwrap();

        let report = r.orch.tick(Instant::now());
        assert!(report.from_peripheral);
        assert_eq!(report.pushed, 3);
        assert_eq!(r.buffer.read().to_vec(), vec![7.0, 8.0, 9.0]);

        // Empty queue means an empty frame, never a synthetic fill-in
        assert_eq!(r.orch.tick(Instant::now()).pushed, 0);
    }

    #[test]
    fn test_connected_without_telemetry_uses_synthetic() {
        let mut r = rig();
        stream_peripheral(&r.connection);
        if let Some(h) = r.connection.write().handles.as_mut() {
            h.telemetry = None;
        }
        let report = r.orch.tick(Instant::now());
        assert!(!report.from_peripheral);
        assert_eq!(report.pushed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let r = rig();
        let cancel = CancellationToken::new();
        let buffer = r.buffer.clone();
        let handle = tokio::spawn(r.orch.run(60.0, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
        let frames = handle.await.unwrap();
        assert!(frames >= 25, "frames {frames}");
        assert!(!buffer.read().is_empty());
    }
}
