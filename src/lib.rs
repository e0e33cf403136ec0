//! Tremor Monitor: real-time tremor signal acquisition and analysis
//!
//! Samples arrive from a synthetic oscillator or a low-energy wireless
//! peripheral, land in a bounded rolling buffer, and are analysed twice a
//! second into a vector of clinical-style features.
//!
//! ## Architecture
//!
//! - **Acquisition**: rolling [`SampleBuffer`], synthetic source, peripheral feed
//! - **Processing**: statistics, spectrum and the feature vector
//! - **Link**: peripheral session, wire codec, simulated and cable-stub links
//! - **Pipeline**: frame driver, feature scheduler, controls, composition root
//! - **API**: JSON endpoints under `/api/v1`

pub mod acquisition;
pub mod api;
pub mod config;
pub mod link;
pub mod pipeline;
pub mod processing;
pub mod shared;
pub mod types;

// Re-export configuration
pub use config::EngineConfig;

// Re-export commonly used types
pub use types::{
    ClinicalMetrics, ConnectionMode, ConnectionState, IndicatorBand, IndicatorLevel, LinkStatus,
    MetricKind, PeripheralCommand, Sequence, SequenceStep, SignalParams, TelemetryPacket,
};

// Re-export acquisition components
pub use acquisition::{SampleBuffer, SyntheticSampleSource};

// Re-export link components
pub use link::{
    LoopbackTransport, PeripheralLinkSession, PeripheralTransport, SessionEvent, UnavailableTransport,
};

// Re-export pipeline components
pub use pipeline::{
    AcquisitionOrchestrator, ConnectionController, Engine, EngineHandles,
    FeatureExtractionScheduler, TaskName,
};

pub use shared::Shared;
