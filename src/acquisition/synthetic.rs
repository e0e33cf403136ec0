//! Sine-plus-noise oscillator standing in for a real sensor.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::f64::consts::PI;

use crate::config::defaults::NOISE_SCALE;
use crate::types::SignalParams;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SyntheticSample {
    /// Accumulated source time (seconds).
    pub t: f64,
    pub sample: f64,
}

/// Keeps its own time accumulator so phase is independent of buffer
/// windowing. Generic over the random source so tests can seed it.
#[derive(Debug, Clone)]
pub struct SyntheticSampleSource<R = StdRng> {
    t: f64,
    rng: R,
}

impl SyntheticSampleSource<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for SyntheticSampleSource<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> SyntheticSampleSource<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { t: 0.0, rng }
    }

    /// Advance by `delta` seconds and produce one sample.
    pub fn next_sample(&mut self, delta: f64, params: &SignalParams) -> SyntheticSample {
        if delta.is_finite() && delta > 0.0 {
            self.t += delta;
        }
        let amp = params.effective_amplitude();
        let signal = amp * (2.0 * PI * params.frequency * self.t).sin();
        let jitter: f64 = self.rng.gen_range(-1.0..1.0);
        SyntheticSample {
            t: self.t,
            sample: signal + jitter * params.noise * NOISE_SCALE,
        }
    }

    pub fn reset(&mut self) {
        self.t = 0.0;
    }

    pub fn time(&self) -> f64 {
        self.t
    }
}
