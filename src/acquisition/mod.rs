//! Sample acquisition: rolling buffer, synthetic oscillator and providers

pub mod buffer;
pub mod provider;
pub mod synthetic;

pub use buffer::{target_capacity, BufferView, SampleBuffer};
pub use provider::{PeripheralFeed, SampleProvider};
pub use synthetic::{SyntheticSample, SyntheticSampleSource};
