//! Signal processing: statistics, spectrum and clinical features
//!
//! Every routine here is total. Insufficient data produces zero or empty
//! results so the 500 ms readout never stalls waiting for samples.

pub mod clinical;
pub mod spectrum;
pub mod stats;

pub use clinical::{compute_metrics, severity_score, AnalysisSettings, FrequencyHistory};
pub use spectrum::{
    bandwidth, dominant_frequency, harmonic_ratio, spectrum, FrequencyBand, SpectrumBin,
};
pub use stats::{peak_to_peak, stability, summary, windowed_rms, SignalSummary};
