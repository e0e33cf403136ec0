//! Parameter sequences played locally or pushed to the device.

use serde::{Deserialize, Serialize};

use super::SignalParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    /// Seconds this step is held.
    pub duration: f64,
    pub freq: f64,
    pub amp: f64,
    pub noise: f64,
}

impl SequenceStep {
    /// Parameters applied while this step plays. Always enabled.
    pub fn params(&self) -> SignalParams {
        SignalParams {
            frequency: self.freq,
            amplitude: self.amp,
            noise: self.noise,
            enabled: true,
        }
        .clamped()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub name: String,
    pub steps: Vec<SequenceStep>,
}
