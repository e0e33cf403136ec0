//! Engine status summary
//!
//! Aggregated read-only view across the shared handles, served by the
//! status endpoint.

use serde::Serialize;

use super::recorder::RecorderStatus;
use super::sequence::PlaybackState;
use crate::types::{ConnectionMode, LinkStatus, SignalParams};

// ============================================================================
// System Status
// ============================================================================

/// Coarse health of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    /// Frame driver running, no data source connected beyond synthetic.
    Synthetic,
    /// Peripheral telemetry is feeding the buffer.
    Streaming,
    /// Display and analysis are frozen on the snapshot.
    Frozen,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub system: SystemStatus,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub mode: ConnectionMode,
    pub link_status: LinkStatus,
    pub params: SignalParams,
    pub analyses: u64,
    pub buffer_len: usize,
    pub buffer_capacity: usize,
    pub sample_rate: f64,
    pub recording: RecorderStatus,
    pub playback: PlaybackState,
}

impl SystemStatus {
    pub fn derive(frozen: bool, streaming: bool) -> Self {
        if frozen {
            Self::Frozen
        } else if streaming {
            Self::Streaming
        } else {
            Self::Synthetic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_wins() {
        assert_eq!(SystemStatus::derive(true, true), SystemStatus::Frozen);
        assert_eq!(SystemStatus::derive(false, true), SystemStatus::Streaming);
        assert_eq!(SystemStatus::derive(false, false), SystemStatus::Synthetic);
    }
}
