//! Acquisition and Analysis Pipeline
//!
//! ```text
//! FrameDriver (60 Hz)        synthetic source | peripheral feed -> SampleBuffer
//! FeatureScheduler (500 ms)  SampleBuffer (or snapshot) -> ClinicalMetrics
//! ConnectionController       simulated | peripheral | cable-stub link backends
//! Controls                   parameters, sequence playback, session recording
//! ```
//!
//! [`Engine`] wires the shared handles together; the HTTP layer only sees
//! [`EngineHandles`].

pub mod connection;
pub mod engine;
pub mod orchestrator;
pub mod params;
pub mod recorder;
pub mod scheduler;
pub mod sequence;
mod state;

pub use connection::{ConnectionController, ConnectionView, LinkBackend, ToggleOutcome};
pub use engine::{Engine, EngineHandles, TaskName};
pub use orchestrator::{AcquisitionOrchestrator, FrameReport};
pub use params::{ParamsControl, ParamsUpdate, ParamsView};
pub use recorder::{RecordedSession, SessionRecorder};
pub use scheduler::{FeatureExtractionScheduler, MetricsSnapshot};
pub use sequence::{PlaybackState, SequencePlayer};
pub use state::*;
