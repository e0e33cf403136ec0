//! btleplug-backed transport for real low-energy wireless sensors.
//!
//! Built only with the `ble` feature. The first adapter reported by the
//! platform manager is used; discovery scans for a fixed window and picks
//! the first peripheral whose advertised name matches the filter prefix.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::transport::{DeviceFilter, LinkEvent, PeripheralTransport, TransportError};
use crate::types::{ChannelHandle, DeviceHandle};

const SCAN_WINDOW: Duration = Duration::from_secs(3);
const EVENT_QUEUE_DEPTH: usize = 256;

pub struct BtleTransport {
    adapter: Option<Adapter>,
    peripherals: Mutex<HashMap<String, Peripheral>>,
}

impl BtleTransport {
    /// Probe the platform for an adapter. A missing adapter yields an
    /// unavailable transport rather than an error.
    pub async fn new() -> Self {
        let adapter = match Manager::new().await {
            Ok(manager) => match manager.adapters().await {
                Ok(adapters) => adapters.into_iter().next(),
                Err(e) => {
                    warn!(error = %e, "Failed to enumerate Bluetooth adapters");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Bluetooth manager unavailable");
                None
            }
        };
        if adapter.is_some() {
            info!("📶 Bluetooth adapter found");
        }
        Self {
            adapter,
            peripherals: Mutex::new(HashMap::new()),
        }
    }

    fn adapter(&self) -> Result<&Adapter, TransportError> {
        self.adapter
            .as_ref()
            .ok_or_else(|| TransportError::Unavailable("no Bluetooth adapter".into()))
    }

    fn peripheral(&self, device: &DeviceHandle) -> Result<Peripheral, TransportError> {
        self.peripherals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&device.id)
            .cloned()
            .ok_or(TransportError::NotConnected)
    }

    fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic, TransportError> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }
}

#[async_trait]
impl PeripheralTransport for BtleTransport {
    fn is_available(&self) -> bool {
        self.adapter.is_some()
    }

    fn transport_name(&self) -> &str {
        "btleplug"
    }

    async fn request_device(&self, filter: &DeviceFilter) -> Result<DeviceHandle, TransportError> {
        let adapter = self.adapter()?;
        adapter
            .start_scan(ScanFilter { services: vec![filter.service] })
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        tokio::time::sleep(SCAN_WINDOW).await;
        let found = adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        if let Err(e) = adapter.stop_scan().await {
            debug!(error = %e, "stop_scan failed");
        }

        for peripheral in found {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            let name = props.local_name.unwrap_or_default();
            if !filter.matches_name(&name) {
                continue;
            }
            let id = format!("{:?}", peripheral.id());
            info!(device = %name, id = %id, "Found matching peripheral");
            self.peripherals
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(id.clone(), peripheral);
            return Ok(DeviceHandle { id, name });
        }
        Err(TransportError::NoDevice(filter.name_prefix.clone()))
    }

    async fn connect(&self, device: &DeviceHandle) -> Result<mpsc::Receiver<LinkEvent>, TransportError> {
        let adapter = self.adapter()?.clone();
        let peripheral = self.peripheral(device)?;
        peripheral
            .connect()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let mut central = adapter
            .events()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let id = peripheral.id();

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    n = notifications.next() => match n {
                        Some(n) => {
                            let event = LinkEvent::Notification { channel: n.uuid, data: n.value };
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = tx.send(LinkEvent::Disconnected).await;
                            break;
                        }
                    },
                    ev = central.next() => match ev {
                        Some(CentralEvent::DeviceDisconnected(gone)) if gone == id => {
                            let _ = tx.send(LinkEvent::Disconnected).await;
                            break;
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            debug!("btleplug event forwarder stopped");
        });
        Ok(rx)
    }

    async fn primary_service(&self, device: &DeviceHandle, service: Uuid) -> Result<(), TransportError> {
        let peripheral = self.peripheral(device)?;
        if peripheral.services().iter().any(|s| s.uuid == service) {
            Ok(())
        } else {
            Err(TransportError::ServiceNotFound(service))
        }
    }

    async fn characteristic(
        &self,
        device: &DeviceHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<ChannelHandle, TransportError> {
        let peripheral = self.peripheral(device)?;
        let c = Self::find_characteristic(&peripheral, characteristic)?;
        if c.service_uuid != service {
            return Err(TransportError::CharacteristicNotFound(characteristic));
        }
        Ok(ChannelHandle {
            uuid: c.uuid,
            notify: c.properties.contains(CharPropFlags::NOTIFY),
            writable: c
                .properties
                .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
        })
    }

    async fn subscribe(&self, device: &DeviceHandle, channel: &ChannelHandle) -> Result<(), TransportError> {
        let peripheral = self.peripheral(device)?;
        let c = Self::find_characteristic(&peripheral, channel.uuid)?;
        peripheral
            .subscribe(&c)
            .await
            .map_err(|e| TransportError::Subscribe(channel.uuid, e.to_string()))
    }

    async fn write(
        &self,
        device: &DeviceHandle,
        channel: &ChannelHandle,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let peripheral = self.peripheral(device)?;
        let c = Self::find_characteristic(&peripheral, channel.uuid)?;
        peripheral
            .write(&c, payload, WriteType::WithResponse)
            .await
            .map_err(|e| TransportError::Write(channel.uuid, e.to_string()))
    }

    async fn disconnect(&self, device: &DeviceHandle) -> Result<(), TransportError> {
        let peripheral = self.peripheral(device)?;
        peripheral
            .disconnect()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))
    }
}
