//! In-memory peripheral that behaves like the sensor firmware.
//!
//! Answers pings with pongs, optionally streams a synthetic tremor signal
//! that follows `params`/`stop` commands, and exposes fault injection
//! (unavailable adapter, connect failure, write failure, link drop) so the
//! session state machine can be exercised without hardware.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use super::codec;
use super::transport::{DeviceFilter, LinkEvent, PeripheralTransport, TransportError};
use crate::acquisition::SyntheticSampleSource;
use crate::config::PeripheralConfig;
use crate::types::{ChannelHandle, DeviceHandle, PeripheralCommand, SignalParams};

const EVENT_QUEUE_DEPTH: usize = 256;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug)]
struct LoopbackInner {
    device: DeviceHandle,
    service: Uuid,
    control: Uuid,
    telemetry: Uuid,
    available: AtomicBool,
    has_telemetry: AtomicBool,
    telemetry_notifies: AtomicBool,
    fail_connect: AtomicBool,
    fail_writes: AtomicBool,
    auto_pong: AtomicBool,
    subscribed: AtomicBool,
    connection_id: AtomicU64,
    connect_delay: Mutex<Duration>,
    pong_delay: Mutex<Duration>,
    stream_rate_hz: Mutex<Option<f64>>,
    params: Mutex<SignalParams>,
    events: Mutex<Option<mpsc::Sender<LinkEvent>>>,
    writes: Mutex<Vec<Vec<u8>>>,
}

/// Cloneable handle; clones drive the same simulated device.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    inner: Arc<LoopbackInner>,
}

impl LoopbackTransport {
    pub fn new(cfg: &PeripheralConfig) -> Self {
        let name = format!("{}-Loopback", cfg.device_name_prefix);
        Self {
            inner: Arc::new(LoopbackInner {
                device: DeviceHandle { id: "loopback-0".into(), name },
                service: cfg.service_uuid,
                control: cfg.control_char_uuid,
                telemetry: cfg.telemetry_char_uuid,
                available: AtomicBool::new(true),
                has_telemetry: AtomicBool::new(true),
                telemetry_notifies: AtomicBool::new(true),
                fail_connect: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                auto_pong: AtomicBool::new(true),
                subscribed: AtomicBool::new(false),
                connection_id: AtomicU64::new(0),
                connect_delay: Mutex::new(Duration::ZERO),
                pong_delay: Mutex::new(Duration::ZERO),
                stream_rate_hz: Mutex::new(None),
                params: Mutex::new(SignalParams::default()),
                events: Mutex::new(None),
                writes: Mutex::new(Vec::new()),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Device behaviour knobs
    // ------------------------------------------------------------------

    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Remove the telemetry characteristic entirely.
    pub fn set_has_telemetry(&self, present: bool) {
        self.inner.has_telemetry.store(present, Ordering::SeqCst);
    }

    /// Keep the telemetry characteristic but without notify support.
    pub fn set_telemetry_notifies(&self, notifies: bool) {
        self.inner.telemetry_notifies.store(notifies, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_auto_pong(&self, enabled: bool) {
        self.inner.auto_pong.store(enabled, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *lock(&self.inner.connect_delay) = delay;
    }

    pub fn set_pong_delay(&self, delay: Duration) {
        *lock(&self.inner.pong_delay) = delay;
    }

    /// Stream one sample per `1 / rate_hz` seconds while connected.
    pub fn with_streaming(self, rate_hz: f64) -> Self {
        *lock(&self.inner.stream_rate_hz) = Some(rate_hz).filter(|r| r.is_finite() && *r > 0.0);
        self
    }

    // ------------------------------------------------------------------
    // Device-side actions
    // ------------------------------------------------------------------

    pub fn is_connected(&self) -> bool {
        lock(&self.inner.events).is_some()
    }

    /// Push a raw notification on the telemetry characteristic.
    /// Returns false when nobody is subscribed.
    pub fn notify(&self, data: impl Into<Vec<u8>>) -> bool {
        if !self.inner.subscribed.load(Ordering::SeqCst) {
            return false;
        }
        let Some(tx) = lock(&self.inner.events).clone() else {
            return false;
        };
        tx.try_send(LinkEvent::Notification {
            channel: self.inner.telemetry,
            data: data.into(),
        })
        .is_ok()
    }

    pub fn notify_json(&self, value: &serde_json::Value) -> bool {
        self.notify(value.to_string().into_bytes())
    }

    /// Peripheral-initiated link drop.
    pub fn drop_link(&self) {
        let tx = lock(&self.inner.events).take();
        self.inner.subscribed.store(false, Ordering::SeqCst);
        self.inner.connection_id.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = tx {
            let _ = tx.try_send(LinkEvent::Disconnected);
        }
    }

    /// Every command written to the control characteristic, decoded.
    pub fn written_commands(&self) -> Vec<PeripheralCommand> {
        lock(&self.inner.writes)
            .iter()
            .filter_map(|bytes| serde_json::from_slice(bytes).ok())
            .collect()
    }

    pub fn device_params(&self) -> SignalParams {
        *lock(&self.inner.params)
    }

    fn apply_command(&self, command: &PeripheralCommand) {
        match command {
            PeripheralCommand::Ping { ts, seq } => {
                if self.inner.auto_pong.load(Ordering::SeqCst) {
                    self.schedule_pong(*ts, *seq);
                }
            }
            PeripheralCommand::Params { params } => {
                *lock(&self.inner.params) = *params;
            }
            PeripheralCommand::Stop => {
                let mut p = lock(&self.inner.params);
                p.enabled = false;
                p.amplitude = 0.0;
            }
            other => trace!(command = other.name(), "Loopback ignoring command"),
        }
    }

    fn schedule_pong(&self, ts: i64, seq: u64) {
        let device = self.clone();
        let delay = *lock(&self.inner.pong_delay);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            device.notify_json(&json!({"type": "pong", "seq": seq, "ts": ts}));
        });
    }

    fn spawn_streamer(&self, connection: u64, rate_hz: f64) {
        let device = self.clone();
        tokio::spawn(async move {
            let mut source = SyntheticSampleSource::new();
            let period = Duration::from_secs_f64(1.0 / rate_hz);
            let mut ticker = tokio::time::interval(period);
            let mut seq: u64 = 0;
            loop {
                ticker.tick().await;
                if device.inner.connection_id.load(Ordering::SeqCst) != connection
                    || !device.is_connected()
                {
                    break;
                }
                let params = device.device_params();
                let sample = source.next_sample(period.as_secs_f64(), &params).sample;
                seq += 1;
                device.notify_json(&json!({"sample": sample, "seq": seq}));
            }
            debug!(connection, "Loopback streamer stopped");
        });
    }
}

#[async_trait]
impl PeripheralTransport for LoopbackTransport {
    fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    fn transport_name(&self) -> &str {
        "loopback"
    }

    async fn request_device(&self, filter: &DeviceFilter) -> Result<DeviceHandle, TransportError> {
        if !self.is_available() {
            return Err(TransportError::Unavailable("loopback adapter disabled".into()));
        }
        if filter.service != self.inner.service || !filter.matches_name(&self.inner.device.name) {
            return Err(TransportError::NoDevice(filter.name_prefix.clone()));
        }
        Ok(self.inner.device.clone())
    }

    async fn connect(&self, _device: &DeviceHandle) -> Result<mpsc::Receiver<LinkEvent>, TransportError> {
        let delay = *lock(&self.inner.connect_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.inner.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("loopback refused connection".into()));
        }
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        {
            let mut events = lock(&self.inner.events);
            if events.is_some() {
                // Already linked: the existing connection keeps the event stream
                debug!("Loopback already connected, returning a detached event stream");
                return Ok(rx);
            }
            *events = Some(tx);
        }
        let connection = self.inner.connection_id.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(rate) = *lock(&self.inner.stream_rate_hz) {
            self.spawn_streamer(connection, rate);
        }
        Ok(rx)
    }

    async fn primary_service(&self, _device: &DeviceHandle, service: Uuid) -> Result<(), TransportError> {
        if service == self.inner.service {
            Ok(())
        } else {
            Err(TransportError::ServiceNotFound(service))
        }
    }

    async fn characteristic(
        &self,
        _device: &DeviceHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<ChannelHandle, TransportError> {
        if service != self.inner.service {
            return Err(TransportError::ServiceNotFound(service));
        }
        if characteristic == self.inner.control {
            return Ok(ChannelHandle { uuid: characteristic, notify: false, writable: true });
        }
        if characteristic == self.inner.telemetry && self.inner.has_telemetry.load(Ordering::SeqCst) {
            return Ok(ChannelHandle {
                uuid: characteristic,
                notify: self.inner.telemetry_notifies.load(Ordering::SeqCst),
                writable: false,
            });
        }
        Err(TransportError::CharacteristicNotFound(characteristic))
    }

    async fn subscribe(&self, _device: &DeviceHandle, channel: &ChannelHandle) -> Result<(), TransportError> {
        if !channel.notify {
            return Err(TransportError::Subscribe(channel.uuid, "notify not supported".into()));
        }
        self.inner.subscribed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write(
        &self,
        _device: &DeviceHandle,
        channel: &ChannelHandle,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Write(channel.uuid, "loopback write fault".into()));
        }
        lock(&self.inner.writes).push(payload.to_vec());
        match serde_json::from_slice::<PeripheralCommand>(payload) {
            Ok(command) => self.apply_command(&command),
            Err(e) => debug!(error = %e, "Loopback received non-command payload"),
        }
        Ok(())
    }

    async fn disconnect(&self, _device: &DeviceHandle) -> Result<(), TransportError> {
        *lock(&self.inner.events) = None;
        self.inner.subscribed.store(false, Ordering::SeqCst);
        self.inner.connection_id.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Encode helper for tests that want to inject binary samples.
pub fn f32_notification(sample: f32) -> Vec<u8> {
    sample.to_le_bytes().to_vec()
}
