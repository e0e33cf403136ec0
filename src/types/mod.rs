//! Shared data structures for tremor acquisition and analysis
//!
//! - ConnectionState: link session record (mode, status, latency, PER, probe)
//! - SignalParams: clamped synthetic oscillator settings
//! - ClinicalMetrics: feature vector published every analysis tick
//! - TelemetryPacket / PeripheralCommand: peripheral wire format
//! - Sequence: timed parameter steps

mod connection;
mod metrics;
mod params;
mod sequence;
mod telemetry;

pub use connection::*;
pub use metrics::*;
pub use params::*;
pub use sequence::*;
pub use telemetry::*;
