//! Peripheral transport abstraction.
//!
//! The session drives discovery, GATT connect, characteristic lookup,
//! subscription and writes through this trait. Implementations: the
//! in-memory [`LoopbackTransport`](super::loopback::LoopbackTransport) and,
//! with the `ble` feature, a btleplug-backed adapter.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::{ChannelHandle, DeviceHandle};

/// Discovery filter derived from peripheral configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Advertised name prefix. Empty accepts any device.
    pub name_prefix: String,
    pub service: Uuid,
}

impl DeviceFilter {
    pub fn matches_name(&self, name: &str) -> bool {
        self.name_prefix.is_empty() || name.starts_with(&self.name_prefix)
    }
}

/// Events delivered for one GATT connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Characteristic value notification.
    Notification { channel: Uuid, data: Vec<u8> },
    /// Peripheral-initiated link drop.
    Disconnected,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("no device matching prefix '{0}' found")]
    NoDevice(String),

    #[error("GATT connect failed: {0}")]
    Connect(String),

    #[error("service {0} not found")]
    ServiceNotFound(Uuid),

    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("subscribe to {0} failed: {1}")]
    Subscribe(Uuid, String),

    #[error("write to {0} failed: {1}")]
    Write(Uuid, String),

    #[error("device not connected")]
    NotConnected,
}

#[async_trait]
pub trait PeripheralTransport: Send + Sync + 'static {
    /// Whether link capability exists at all (adapter present, powered).
    fn is_available(&self) -> bool;

    /// Human-readable name for logging.
    fn transport_name(&self) -> &str;

    /// Discover a device matching `filter`.
    async fn request_device(&self, filter: &DeviceFilter) -> Result<DeviceHandle, TransportError>;

    /// Open the GATT connection. Events for this connection arrive on the
    /// returned receiver until it closes or yields `Disconnected`.
    async fn connect(&self, device: &DeviceHandle) -> Result<mpsc::Receiver<LinkEvent>, TransportError>;

    /// Confirm the primary service exists.
    async fn primary_service(&self, device: &DeviceHandle, service: Uuid) -> Result<(), TransportError>;

    async fn characteristic(
        &self,
        device: &DeviceHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<ChannelHandle, TransportError>;

    /// Start notifications on `channel`.
    async fn subscribe(&self, device: &DeviceHandle, channel: &ChannelHandle) -> Result<(), TransportError>;

    async fn write(
        &self,
        device: &DeviceHandle,
        channel: &ChannelHandle,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    async fn disconnect(&self, device: &DeviceHandle) -> Result<(), TransportError>;
}

/// Transport for builds without any link capability. Always unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableTransport;

#[async_trait]
impl PeripheralTransport for UnavailableTransport {
    fn is_available(&self) -> bool {
        false
    }

    fn transport_name(&self) -> &str {
        "none"
    }

    async fn request_device(&self, _filter: &DeviceFilter) -> Result<DeviceHandle, TransportError> {
        Err(TransportError::Unavailable("no peripheral transport compiled in".into()))
    }

    async fn connect(&self, _device: &DeviceHandle) -> Result<mpsc::Receiver<LinkEvent>, TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn primary_service(&self, _device: &DeviceHandle, service: Uuid) -> Result<(), TransportError> {
        Err(TransportError::ServiceNotFound(service))
    }

    async fn characteristic(
        &self,
        _device: &DeviceHandle,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<ChannelHandle, TransportError> {
        Err(TransportError::CharacteristicNotFound(characteristic))
    }

    async fn subscribe(&self, _device: &DeviceHandle, _channel: &ChannelHandle) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn write(
        &self,
        _device: &DeviceHandle,
        _channel: &ChannelHandle,
        _payload: &[u8],
    ) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn disconnect(&self, _device: &DeviceHandle) -> Result<(), TransportError> {
        Ok(())
    }
}
