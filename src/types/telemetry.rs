//! Wire-level types exchanged with the peripheral.

use serde::{Deserialize, Serialize};

use super::{Sequence, SignalParams};

/// One decoded inbound notification. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPacket {
    pub sample: Option<f64>,
    /// Finite samples only, in arrival order.
    #[serde(default)]
    pub samples: Vec<f64>,
    pub seq: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub pong: Option<bool>,
    /// Echoed ping timestamp (epoch ms).
    pub ts: Option<f64>,
    /// Device-measured latency (ms).
    pub latency: Option<f64>,
    /// Device-measured packet error rate (percent).
    pub per: Option<f64>,
}

impl TelemetryPacket {
    /// A single-sample packet from the binary fallback decoders.
    pub fn scalar(sample: f64) -> Self {
        Self {
            sample: Some(sample),
            ..Self::default()
        }
    }

    pub fn is_pong(&self) -> bool {
        self.kind.as_deref() == Some("pong") || self.pong == Some(true)
    }

    /// All carried samples: array entries first, then the scalar.
    pub fn all_samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied().chain(self.sample)
    }
}

/// Outbound command envelope, serialized as `{"type": ..., ...payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PeripheralCommand {
    Ping { ts: i64, seq: u64 },
    Params { params: SignalParams },
    Stop,
    SequenceSave { sequence: Sequence },
    SequencePlay { id: String },
    SequenceStop,
}

impl PeripheralCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping { .. } => "ping",
            Self::Params { .. } => "params",
            Self::Stop => "stop",
            Self::SequenceSave { .. } => "sequence-save",
            Self::SequencePlay { .. } => "sequence-play",
            Self::SequenceStop => "sequence-stop",
        }
    }
}

/// Tri-state latency indicator driven into the status chrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyLevel {
    #[default]
    Hidden,
    Warning,
    Alert,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyWarning {
    pub level: LatencyLevel,
    pub message: String,
}

impl LatencyWarning {
    pub fn hidden() -> Self {
        Self::default()
    }

    pub fn new(level: LatencyLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}
