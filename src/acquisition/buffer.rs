//! Bounded rolling sample buffer.
//!
//! Capacity follows the observed sample rate times the visible window,
//! never below 60 samples. The freeze flag is advisory: the acquisition
//! driver consults it, `push` does not.

use serde::Serialize;
use std::collections::VecDeque;

use crate::config::defaults::MIN_BUFFER_CAPACITY;

/// Vertical fraction of the plot used by a full-scale sample.
const PLOT_FILL_RATIO: f64 = 0.35;

/// Full-scale value used when autoscale is off.
const FIXED_FULL_SCALE: f64 = 100.0;

/// `max(60, round(rate * seconds))`.
pub fn target_capacity(sample_rate: f64, window_seconds: f64) -> usize {
    let raw = (sample_rate * window_seconds).round();
    if !raw.is_finite() || raw <= 0.0 {
        return MIN_BUFFER_CAPACITY;
    }
    (raw as usize).max(MIN_BUFFER_CAPACITY)
}

#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
    sample_rate: f64,
    window_seconds: f64,
    gain: f64,
    auto_scale: bool,
    snapshot: Option<Vec<f64>>,
    frozen: bool,
    last_sample: f64,
}

impl SampleBuffer {
    /// Zero-filled buffer at full capacity.
    pub fn new(sample_rate: f64, window_seconds: f64) -> Self {
        let mut buffer = Self::empty(sample_rate, window_seconds);
        buffer.samples.resize(buffer.capacity, 0.0);
        buffer
    }

    /// Buffer with no samples yet.
    pub fn empty(sample_rate: f64, window_seconds: f64) -> Self {
        let capacity = target_capacity(sample_rate, window_seconds);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            sample_rate,
            window_seconds,
            gain: 1.0,
            auto_scale: true,
            snapshot: None,
            frozen: false,
            last_sample: 0.0,
        }
    }

    /// Append, evicting from the front on overflow.
    pub fn push(&mut self, sample: f64) {
        self.samples.push_back(sample);
        self.last_sample = sample;
        self.trim();
    }

    pub fn extend(&mut self, samples: impl IntoIterator<Item = f64>) {
        for s in samples {
            self.push(s);
        }
    }

    fn trim(&mut self) {
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    fn recompute_capacity(&mut self) {
        self.capacity = target_capacity(self.sample_rate, self.window_seconds);
        self.trim();
    }

    /// Change the visible window. Existing samples are trimmed, not refilled.
    pub fn set_window_seconds(&mut self, seconds: f64) {
        if !(seconds.is_finite() && seconds > 0.0) {
            return;
        }
        self.window_seconds = seconds;
        self.recompute_capacity();
    }

    pub fn set_sample_rate_estimate(&mut self, rate: f64) {
        if !(rate.is_finite() && rate > 0.0) {
            return;
        }
        self.sample_rate = rate;
        self.recompute_capacity();
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    /// Returns the new state.
    pub fn toggle_freeze(&mut self) -> bool {
        self.frozen = !self.frozen;
        self.frozen
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn capture_snapshot(&mut self) {
        self.snapshot = Some(self.samples.iter().copied().collect());
    }

    pub fn clear_snapshot(&mut self) {
        self.snapshot = None;
    }

    /// Capture if absent, clear if present. Returns whether one is held.
    pub fn toggle_snapshot(&mut self) -> bool {
        if self.snapshot.is_some() {
            self.clear_snapshot();
        } else {
            self.capture_snapshot();
        }
        self.snapshot.is_some()
    }

    pub fn snapshot(&self) -> Option<&[f64]> {
        self.snapshot.as_deref()
    }

    /// Reallocate zero-filled at the current capacity.
    pub fn clear(&mut self) {
        self.samples = VecDeque::from(vec![0.0; self.capacity]);
        self.last_sample = 0.0;
    }

    pub fn set_gain(&mut self, gain: f64) {
        if gain.is_finite() && gain > 0.0 {
            self.gain = gain;
        }
    }

    pub fn set_auto_scale(&mut self, enabled: bool) {
        self.auto_scale = enabled;
    }

    /// Pixels per sample unit for a plot `height` pixels tall.
    pub fn display_scale(&self, height: f64) -> f64 {
        let full_scale = if self.auto_scale {
            self.samples.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0)
        } else {
            FIXED_FULL_SCALE
        };
        (height * PLOT_FILL_RATIO / full_scale) * self.gain
    }

    /// Snapshot while frozen (when one exists), live samples otherwise.
    pub fn analysis_samples(&self) -> Vec<f64> {
        match (&self.snapshot, self.frozen) {
            (Some(snap), true) => snap.clone(),
            _ => self.to_vec(),
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn auto_scale(&self) -> bool {
        self.auto_scale
    }

    pub fn last_sample(&self) -> f64 {
        self.last_sample
    }

    /// Serializable copy for the rendering layer.
    pub fn view(&self) -> BufferView {
        BufferView {
            samples: self.to_vec(),
            snapshot: self.snapshot.clone(),
            capacity: self.capacity,
            sample_rate: self.sample_rate,
            window_seconds: self.window_seconds,
            gain: self.gain,
            auto_scale: self.auto_scale,
            frozen: self.frozen,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BufferView {
    pub samples: Vec<f64>,
    pub snapshot: Option<Vec<f64>>,
    pub capacity: usize,
    pub sample_rate: f64,
    pub window_seconds: f64,
    pub gain: f64,
    pub auto_scale: bool,
    pub frozen: bool,
}
