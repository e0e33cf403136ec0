//! Peripheral link session state machine.
//!
//! Owns the connect / stream / teardown lifecycle over a
//! [`PeripheralTransport`], decodes telemetry into the inbound sample
//! channel, keeps sequence-based loss accounting and runs the ping/pong
//! latency probe.
//!
//! ## State machine
//!
//! ```text
//! disconnected --connect()--> connecting --ok--> connected
//!      ^                          |                  |
//!      +-------- failure ---------+                  |
//!      +--- disconnect() / link drop / write error --+
//! ```
//!
//! Transport errors never escape: each becomes a state transition plus a
//! log line. Every teardown bumps a generation counter; connect and write
//! continuations capture the generation when they start and apply nothing
//! if it moved while they were suspended.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::accounting;
use super::codec;
use super::latency;
use super::transport::{DeviceFilter, LinkEvent, PeripheralTransport, TransportError};
use crate::config::{LatencyConfig, PeripheralConfig};
use crate::shared::Shared;
use crate::types::{
    ConnectionMode, ConnectionState, DeviceHandle, LatencyWarning, LinkHandles, LinkStatus,
    PeripheralCommand, TelemetryPacket,
};

/// Shown when connect is attempted without link capability.
pub const UNAVAILABLE_NOTICE: &str =
    "Peripheral link is unavailable. Check that a Bluetooth adapter is present and powered.";

/// Shown when the latency probe is started without a connected peripheral.
pub const PROBE_REFUSED_NOTICE: &str = "Connect to a peripheral before starting a latency test.";

const EVENT_CHANNEL_CAPACITY: usize = 64;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Notifications for the view layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    StatusChanged { status: LinkStatus },
    /// User-facing refusal or failure message.
    Notice { message: String },
    ProbeTimeout { seq: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected { streaming: bool },
    /// A connect is in flight or the link is already up.
    AlreadyActive,
    Unavailable,
    /// Session mode is not `peripheral`.
    WrongMode,
    /// Disconnected or restarted while connecting; result discarded.
    Superseded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Sent,
    /// Not connected to a peripheral with a writable control channel.
    Skipped,
    /// Write failed; the session has been torn down.
    Failed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("peripheral link unavailable")]
    Unavailable,

    #[error("not connected to a peripheral")]
    NotConnected,

    #[error("latency test needs a connected peripheral")]
    ProbeNotReady,
}

#[derive(Debug)]
enum EstablishError {
    Transport(TransportError),
    Superseded,
}

impl From<TransportError> for EstablishError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

struct SessionInner {
    transport: Arc<dyn PeripheralTransport>,
    state: Shared<ConnectionState>,
    peripheral: PeripheralConfig,
    latency: LatencyConfig,
    samples_tx: mpsc::Sender<f64>,
    events: broadcast::Sender<SessionEvent>,
    warning: watch::Sender<LatencyWarning>,
    generation: AtomicU64,
    ping_in_flight: AtomicBool,
    /// Cancels the probe interval and every armed timeout.
    probe: Mutex<Option<CancellationToken>>,
    link: Mutex<Option<CancellationToken>>,
}

/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct PeripheralLinkSession {
    inner: Arc<SessionInner>,
}

/// Resets the in-flight flag when a probe ping finishes.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PeripheralLinkSession {
    /// `samples_tx` is the inbound telemetry channel toward the buffer.
    pub fn new(
        transport: Arc<dyn PeripheralTransport>,
        state: Shared<ConnectionState>,
        peripheral: PeripheralConfig,
        latency: LatencyConfig,
        samples_tx: mpsc::Sender<f64>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (warning, _) = watch::channel(LatencyWarning::hidden());
        Self {
            inner: Arc::new(SessionInner {
                transport,
                state,
                peripheral,
                latency,
                samples_tx,
                events,
                warning,
                generation: AtomicU64::new(0),
                ping_in_flight: AtomicBool::new(false),
                probe: Mutex::new(None),
                link: Mutex::new(None),
            }),
        }
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn is_available(&self) -> bool {
        self.inner.transport.is_available()
    }

    pub fn transport_name(&self) -> &str {
        self.inner.transport.transport_name()
    }

    /// Connected to a peripheral with telemetry notifications active.
    pub fn is_streaming(&self) -> bool {
        self.inner.state.read().is_streaming()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Lets sibling link backends publish on the same event stream.
    pub fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.inner.events.clone()
    }

    pub fn latency_warning(&self) -> watch::Receiver<LatencyWarning> {
        self.inner.warning.subscribe()
    }

    pub fn current_warning(&self) -> LatencyWarning {
        self.inner.warning.borrow().clone()
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }

    fn notice(&self, message: &str) {
        info!("[PeripheralLink] {}", message);
        self.emit(SessionEvent::Notice { message: message.to_string() });
    }

    fn publish_latency(&self, latency_ms: Option<f64>, connected: bool) {
        let warning = latency::classify(latency_ms, connected, &self.inner.latency);
        self.inner.warning.send_if_modified(|current| {
            if *current == warning {
                false
            } else {
                *current = warning;
                true
            }
        });
    }

    // ========================================================================
    // Connect / Disconnect
    // ========================================================================

    /// Discover, connect and subscribe. Never returns an error: failures
    /// are logged and leave the session disconnected.
    pub async fn connect(&self) -> ConnectOutcome {
        if !self.is_available() {
            self.notice(UNAVAILABLE_NOTICE);
            return ConnectOutcome::Unavailable;
        }

        let generation = {
            let mut st = self.inner.state.write();
            if st.mode != ConnectionMode::Peripheral {
                return ConnectOutcome::WrongMode;
            }
            if st.status != LinkStatus::Disconnected {
                return ConnectOutcome::AlreadyActive;
            }
            st.status = LinkStatus::Connecting;
            self.generation()
        };
        info!(transport = self.transport_name(), "🔌 Connecting to peripheral...");
        self.emit(SessionEvent::StatusChanged { status: LinkStatus::Connecting });

        // The attempt runs on its own task: dropping the caller's future
        // must not strand the session in `connecting`.
        let session = self.clone();
        match tokio::spawn(async move { session.finish_connect(generation).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Connect task aborted");
                if self.is_current(generation) {
                    self.teardown("connect aborted");
                }
                ConnectOutcome::Failed(e.to_string())
            }
        }
    }

    async fn finish_connect(&self, generation: u64) -> ConnectOutcome {
        match self.establish(generation).await {
            Ok(streaming) => {
                info!(streaming, "✅ Peripheral connected");
                self.emit(SessionEvent::StatusChanged { status: LinkStatus::Connected });
                ConnectOutcome::Connected { streaming }
            }
            Err(EstablishError::Superseded) => {
                debug!("[PeripheralLink] Connect superseded by a newer session");
                ConnectOutcome::Superseded
            }
            Err(EstablishError::Transport(e)) => {
                error!(error = %e, "Peripheral connection failed");
                if self.is_current(generation) {
                    self.teardown("connect failed");
                }
                ConnectOutcome::Failed(e.to_string())
            }
        }
    }

    async fn establish(&self, generation: u64) -> Result<bool, EstablishError> {
        let transport = &self.inner.transport;
        let cfg = &self.inner.peripheral;
        let filter = DeviceFilter {
            name_prefix: cfg.device_name_prefix.clone(),
            service: cfg.service_uuid,
        };

        let device = transport.request_device(&filter).await?;
        if !self.is_current(generation) {
            return Err(EstablishError::Superseded);
        }

        let result = self.open_channels(&device, generation).await;
        if result.is_err() {
            if self.claimed_by_newer_attempt(&device, generation) {
                debug!(device = %device.id, "Stale connect left the device to the newer session");
            } else if let Err(e) = transport.disconnect(&device).await {
                // Best effort: leave no half-open GATT link behind
                trace!(error = %e, "Disconnect after failed connect");
            }
        }
        result
    }

    /// True when a later generation is connecting or is connected to
    /// `device`, so the stale attempt must not disconnect it.
    fn claimed_by_newer_attempt(&self, device: &DeviceHandle, generation: u64) -> bool {
        let st = self.inner.state.read();
        if self.is_current(generation) {
            return false;
        }
        match st.status {
            LinkStatus::Disconnected => false,
            LinkStatus::Connecting => true,
            LinkStatus::Connected => st.handles.as_ref().map_or(true, |h| h.device == *device),
        }
    }

    async fn open_channels(&self, device: &DeviceHandle, generation: u64) -> Result<bool, EstablishError> {
        let transport = &self.inner.transport;
        let cfg = &self.inner.peripheral;

        let events = transport.connect(device).await?;
        transport.primary_service(device, cfg.service_uuid).await?;
        let control = transport
            .characteristic(device, cfg.service_uuid, cfg.control_char_uuid)
            .await?;

        let telemetry = match transport
            .characteristic(device, cfg.service_uuid, cfg.telemetry_char_uuid)
            .await
        {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!(error = %e, "Telemetry characteristic unavailable, connecting without streaming");
                None
            }
        };

        let subscribed = match telemetry {
            Some(channel) if channel.notify => {
                transport.subscribe(device, &channel).await?;
                Some(channel)
            }
            Some(_) => {
                warn!("Telemetry characteristic does not notify, connecting without streaming");
                None
            }
            None => None,
        };

        let streaming = subscribed.is_some();
        let link_token = CancellationToken::new();
        {
            let mut st = self.inner.state.write();
            // Checked under the lock teardown takes to bump the generation
            if !self.is_current(generation) || st.status != LinkStatus::Connecting {
                return Err(EstablishError::Superseded);
            }
            st.handles = Some(LinkHandles {
                device: device.clone(),
                control,
                telemetry: subscribed,
            });
            st.status = LinkStatus::Connected;
            st.reset_metrics();
        }
        if let Some(old) = lock(&self.inner.link).replace(link_token.clone()) {
            old.cancel();
        }
        self.publish_latency(None, true);

        let session = self.clone();
        tokio::spawn(async move {
            session.pump(events, generation, link_token).await;
        });
        Ok(streaming)
    }

    /// Route link events for one connection until it ends or is cancelled.
    async fn pump(self, mut events: mpsc::Receiver<LinkEvent>, generation: u64, cancel: CancellationToken) {
        let telemetry_uuid = self.inner.peripheral.telemetry_char_uuid;
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                ev = events.recv() => ev,
            };
            match event {
                Some(LinkEvent::Notification { channel, data }) if channel == telemetry_uuid => {
                    self.ingest(&data);
                }
                Some(LinkEvent::Notification { channel, .. }) => {
                    trace!(%channel, "Ignoring notification from unexpected characteristic");
                }
                Some(LinkEvent::Disconnected) | None => {
                    if self.is_current(generation) {
                        warn!("⚠️ Peripheral dropped the link");
                        self.teardown("link dropped");
                    }
                    break;
                }
            }
        }
        debug!(generation, "[PeripheralLink] Event pump stopped");
    }

    /// Explicit user disconnect. Idempotent.
    pub async fn disconnect(&self) {
        let device = self
            .inner
            .state
            .read()
            .handles
            .as_ref()
            .map(|h| h.device.clone());
        self.teardown("user disconnect");
        if let Some(device) = device {
            if let Err(e) = self.inner.transport.disconnect(&device).await {
                warn!(error = %e, "Transport disconnect failed");
            }
        }
    }

    /// Shared path for every way a session ends: stop the probe, drop
    /// handles, reset metrics, invalidate in-flight continuations.
    fn teardown(&self, reason: &str) {
        self.cancel_probe_tasks();
        if let Some(token) = lock(&self.inner.link).take() {
            token.cancel();
        }
        let was = {
            let mut st = self.inner.state.write();
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            let was = st.status;
            st.force_disconnected();
            was
        };
        self.inner.ping_in_flight.store(false, Ordering::SeqCst);
        self.publish_latency(None, false);
        if was != LinkStatus::Disconnected {
            info!(reason, "🔌 Peripheral disconnected");
        }
        self.emit(SessionEvent::StatusChanged { status: LinkStatus::Disconnected });
    }

    /// Detach from the peripheral when the session is switched away from.
    pub async fn shutdown(&self) {
        self.stop_latency_test();
        self.disconnect().await;
    }

    // ========================================================================
    // Telemetry
    // ========================================================================

    /// Decode and apply one raw notification. Undecodable payloads are
    /// dropped without counting as loss.
    pub fn ingest(&self, bytes: &[u8]) {
        match codec::decode_telemetry(bytes) {
            Some(packet) => self.handle_packet(&packet),
            None => trace!(len = bytes.len(), "Dropping undecodable telemetry"),
        }
    }

    fn forward_sample(&self, sample: f64) {
        match self.inner.samples_tx.try_send(sample) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Telemetry queue full, dropping sample"),
            Err(TrySendError::Closed(_)) => trace!("Telemetry queue closed"),
        }
    }

    fn handle_packet(&self, packet: &TelemetryPacket) {
        for sample in packet.all_samples() {
            self.forward_sample(sample);
        }

        let now = now_ms() as f64;
        let window = self.inner.latency.sample_window;
        let (latency_ms, connected) = {
            let mut st = self.inner.state.write();

            // Pong sequence numbers echo the ping counter, not the
            // telemetry stream, so they stay out of loss accounting
            if packet.is_pong() {
                if let Some(ts) = packet.ts {
                    st.latency_ms = Some((now - ts).max(0.0));
                } else if let Some(sent) = st.last_ping_sent_at {
                    let last = i64::try_from(st.last_ping_sequence).unwrap_or(i64::MAX);
                    if packet.seq.map_or(true, |seq| seq == last) {
                        st.latency_ms = Some((now - sent as f64).max(0.0));
                    }
                }
                st.latency_probe.pending_sequence = None;
                if let Some(latency) = st.latency_ms {
                    if st.latency_probe.active {
                        st.latency_probe.record(latency, window);
                    }
                }
            } else if let Some(seq) = packet.seq {
                // Telemetry packets only: pong seq values never count toward PER
                let per = accounting::update_from_sequence(&mut st.packet_stats, seq);
                st.packet_error_rate = Some(per);
            }

            if let Some(latency) = packet.latency {
                st.latency_ms = Some(latency);
                if st.latency_probe.active {
                    st.latency_probe.record(latency, window);
                }
            }
            if let Some(per) = packet.per {
                st.packet_error_rate = Some(per);
            }
            (st.latency_ms, st.is_connected())
        };
        self.publish_latency(latency_ms, connected);
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Send a command on the control channel. A write failure tears the
    /// session down.
    pub async fn send_command(&self, command: PeripheralCommand) -> CommandOutcome {
        let (device, control, generation) = {
            let st = self.inner.state.read();
            let Some(control) = st.writable_control().cloned() else {
                trace!(command = command.name(), "Skipping command, no writable control channel");
                return CommandOutcome::Skipped;
            };
            let Some(device) = st.handles.as_ref().map(|h| h.device.clone()) else {
                return CommandOutcome::Skipped;
            };
            (device, control, self.generation())
        };

        let result = match codec::encode_command(&command) {
            Ok(payload) => self
                .inner
                .transport
                .write(&device, &control, &payload)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("encode failed: {e}")),
        };

        match result {
            Ok(()) => {
                trace!(command = command.name(), "Command sent");
                CommandOutcome::Sent
            }
            Err(e) => {
                if self.is_current(generation) {
                    error!(command = command.name(), error = %e, "Peripheral write failed");
                    self.teardown("write failed");
                } else {
                    debug!(command = command.name(), "Stale write failure ignored");
                }
                CommandOutcome::Failed(e)
            }
        }
    }

    /// Allocate the next ping sequence and mark it pending.
    fn begin_ping(&self) -> (i64, u64) {
        let mut st = self.inner.state.write();
        let seq = st.last_ping_sequence + 1;
        let ts = now_ms();
        st.last_ping_sequence = seq;
        st.last_ping_sent_at = Some(ts);
        st.latency_probe.pending_sequence = Some(seq);
        (ts, seq)
    }

    /// One-shot ping. Latency is the write round-trip; PER defaults to 0.
    /// Returns the measured latency, or `None` when not connected.
    pub async fn ping(&self) -> Option<f64> {
        let generation = {
            let st = self.inner.state.read();
            if st.mode != ConnectionMode::Peripheral || !st.is_connected() {
                return None;
            }
            self.generation()
        };
        let started = Instant::now();
        let (ts, seq) = self.begin_ping();
        self.send_command(PeripheralCommand::Ping { ts, seq }).await;
        self.schedule_probe_timeout(seq);

        let latency = (started.elapsed().as_secs_f64() * 1000.0).round();
        let (latency_ms, connected) = {
            let mut st = self.inner.state.write();
            if !self.is_current(generation) {
                return None;
            }
            st.latency_ms = Some(latency);
            st.packet_error_rate.get_or_insert(0.0);
            (st.latency_ms, st.is_connected())
        };
        self.publish_latency(latency_ms, connected);
        Some(latency)
    }

    // ========================================================================
    // Latency Probe
    // ========================================================================

    fn can_run_latency_test(&self) -> bool {
        let st = self.inner.state.read();
        st.mode == ConnectionMode::Peripheral && st.is_connected() && self.is_available()
    }

    /// Begin periodic pings. Refused with a notice unless connected to a
    /// peripheral over an available transport. Starting twice is a no-op.
    pub fn start_latency_test(&self) -> Result<(), LinkError> {
        if self.inner.state.read().latency_probe.active {
            return Ok(());
        }
        if !self.can_run_latency_test() {
            self.notice(PROBE_REFUSED_NOTICE);
            return Err(LinkError::ProbeNotReady);
        }
        {
            let mut st = self.inner.state.write();
            st.latency_probe.active = true;
            st.latency_probe.samples.clear();
        }

        let token = CancellationToken::new();
        if let Some(old) = lock(&self.inner.probe).replace(token.clone()) {
            old.cancel();
        }

        let session = self.clone();
        let period = Duration::from_millis(self.inner.latency.test_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let s = session.clone();
                        tokio::spawn(async move { s.run_probe_ping().await });
                    }
                }
            }
            debug!("[LatencyProbe] Interval stopped");
        });
        info!(interval_ms = self.inner.latency.test_interval_ms, "📡 Latency test started");
        Ok(())
    }

    async fn run_probe_ping(&self) {
        if !self.can_run_latency_test() {
            return;
        }
        if self.inner.ping_in_flight.swap(true, Ordering::SeqCst) {
            trace!("[LatencyProbe] Previous ping still in flight, skipping tick");
            return;
        }
        let _in_flight = InFlight(&self.inner.ping_in_flight);
        let (ts, seq) = self.begin_ping();
        self.send_command(PeripheralCommand::Ping { ts, seq }).await;
        self.schedule_probe_timeout(seq);
    }

    /// Arm the timeout for one outstanding ping. Inert unless the probe is
    /// running; cancelled with the probe.
    fn schedule_probe_timeout(&self, seq: u64) {
        let Some(token) = lock(&self.inner.probe).clone() else {
            return;
        };
        let session = self.clone();
        let timeout = Duration::from_millis(self.inner.latency.probe_timeout_ms());
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => session.check_probe_timeout(seq),
            }
        });
    }

    /// A later pending sequence still means nothing came back since `seq`.
    fn check_probe_timeout(&self, seq: u64) {
        let timed_out = {
            let st = self.inner.state.read();
            st.latency_probe.active
                && st.latency_probe.pending_sequence.is_some_and(|pending| pending >= seq)
        };
        if timed_out {
            warn!(seq, "⏱️ Latency probe timed out");
            self.inner.warning.send_replace(latency::probe_timeout_warning());
            self.emit(SessionEvent::ProbeTimeout { seq });
        }
    }

    fn cancel_probe_tasks(&self) {
        if let Some(token) = lock(&self.inner.probe).take() {
            token.cancel();
        }
    }

    /// Stop pinging and clear pending state. Timers are cancelled before
    /// this returns.
    pub fn stop_latency_test(&self) {
        let was_active = {
            let mut st = self.inner.state.write();
            let was = st.latency_probe.active;
            st.latency_probe.active = false;
            st.latency_probe.pending_sequence = None;
            was
        };
        self.cancel_probe_tasks();
        if was_active {
            info!("📡 Latency test stopped");
        }
    }

    pub fn toggle_latency_test(&self) -> Result<bool, LinkError> {
        if self.inner.state.read().latency_probe.active {
            self.stop_latency_test();
            Ok(false)
        } else {
            self.start_latency_test().map(|()| true)
        }
    }
}
