//! Link session record shared by the connection backends.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which backend feeds the connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionMode {
    /// Fake link with random latency/PER; samples come from the synthetic source.
    #[default]
    Simulated,
    /// Real low-energy wireless sensor.
    Peripheral,
    /// Wired transport placeholder; always disconnected.
    CableStub,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Simulated => "simulated",
            Self::Peripheral => "peripheral",
            Self::CableStub => "cable-stub",
        };
        f.write_str(s)
    }
}

impl FromStr for ConnectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "mock" | "sim" => Ok(Self::Simulated),
            "peripheral" | "bluetooth" | "ble" => Ok(Self::Peripheral),
            "cable-stub" | "cable" | "usb" => Ok(Self::CableStub),
            other => Err(format!(
                "unknown connection mode '{other}' (expected simulated, peripheral or cable-stub)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Opaque handle to a discovered peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    pub id: String,
    pub name: String,
}

/// Opaque handle to one GATT characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHandle {
    pub uuid: Uuid,
    pub notify: bool,
    pub writable: bool,
}

/// Handles held only while a peripheral session is connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkHandles {
    pub device: DeviceHandle,
    pub control: ChannelHandle,
    /// Present only when the telemetry characteristic exists and notifies.
    pub telemetry: Option<ChannelHandle>,
}

/// Sequence-number bookkeeping for the PER estimate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketStats {
    pub last_seq: Option<i64>,
    pub received: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyProbeState {
    pub active: bool,
    /// Most recent round-trips in ms, oldest first.
    pub samples: VecDeque<f64>,
    pub pending_sequence: Option<u64>,
}

impl LatencyProbeState {
    /// Append a round-trip, evicting the oldest beyond `window`.
    pub fn record(&mut self, latency_ms: f64, window: usize) {
        self.samples.push_back(latency_ms);
        while self.samples.len() > window {
            self.samples.pop_front();
        }
    }

    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }
}

/// Mutable session record for the active link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub mode: ConnectionMode,
    pub status: LinkStatus,
    /// Most recent round-trip (ms).
    pub latency_ms: Option<f64>,
    /// Percent of expected sequence numbers never received.
    pub packet_error_rate: Option<f64>,
    pub handles: Option<LinkHandles>,
    /// Epoch milliseconds of the last ping written.
    pub last_ping_sent_at: Option<i64>,
    pub last_ping_sequence: u64,
    pub packet_stats: PacketStats,
    pub latency_probe: LatencyProbeState,
}

impl ConnectionState {
    pub fn new(mode: ConnectionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == LinkStatus::Connected
    }

    /// Connected to a peripheral that is delivering telemetry notifications.
    pub fn is_streaming(&self) -> bool {
        self.mode == ConnectionMode::Peripheral
            && self.status == LinkStatus::Connected
            && self
                .handles
                .as_ref()
                .is_some_and(|h| h.telemetry.is_some())
    }

    /// Writable control channel, if commands can be sent right now.
    pub fn writable_control(&self) -> Option<&ChannelHandle> {
        if self.mode != ConnectionMode::Peripheral || self.status != LinkStatus::Connected {
            return None;
        }
        self.handles
            .as_ref()
            .map(|h| &h.control)
            .filter(|c| c.writable)
    }

    /// Clean metrics baseline: no latency, no PER, counters and probe zeroed.
    pub fn reset_metrics(&mut self) {
        self.latency_ms = None;
        self.packet_error_rate = None;
        self.packet_stats = PacketStats::default();
        self.last_ping_sent_at = None;
        self.last_ping_sequence = 0;
        self.latency_probe = LatencyProbeState::default();
    }

    /// Full teardown to the disconnected baseline.
    pub fn force_disconnected(&mut self) {
        self.handles = None;
        self.status = LinkStatus::Disconnected;
        self.reset_metrics();
    }
}
