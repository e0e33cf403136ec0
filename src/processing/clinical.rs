//! Clinical feature vector assembly.
//!
//! Combines the time-domain statistics and spectral routines into one
//! [`ClinicalMetrics`] per analysis tick. The dominant-frequency history
//! that feeds the stability index is owned by the caller and survives
//! across ticks.

use std::collections::VecDeque;

use super::spectrum::{self, FrequencyBand};
use super::stats;
use crate::config::defaults::{POWER_FLOOR_DB, STABILITY_HISTORY_LEN};
use crate::types::{ClinicalMetrics, SignalParams};

/// Ordinal 0-4 from RMS amplitude, exclusive lower bounds at 5/15/30/50.
pub fn severity_score(rms: f64) -> u8 {
    match rms {
        r if r > 50.0 => 4,
        r if r > 30.0 => 3,
        r if r > 15.0 => 2,
        r if r > 5.0 => 1,
        _ => 0,
    }
}

/// `10 log10(rms^2)` floored at -40 dB.
pub fn power_db(rms: f64) -> f64 {
    if rms <= 0.0 {
        return POWER_FLOOR_DB;
    }
    (10.0 * (rms * rms).log10()).max(POWER_FLOOR_DB)
}

/// Consistency of the configured signal: more amplitude and less noise
/// reads as more regular.
pub fn regularity_index(params: &SignalParams) -> f64 {
    let amp = params.effective_amplitude();
    if amp <= 0.0 {
        return 0.0;
    }
    (100.0 - (params.noise / amp) * 50.0).clamp(0.0, 100.0)
}

/// SNR of the configured signal in dB, clamped to -10..40.
pub fn snr_db(params: &SignalParams) -> f64 {
    let amp = params.effective_amplitude();
    let signal_power = amp * amp;
    let noise_power = params.noise * params.noise * 0.1;
    if noise_power <= 0.0 {
        return 40.0;
    }
    if signal_power <= 0.0 {
        return -10.0;
    }
    (10.0 * (signal_power / noise_power).log10()).clamp(-10.0, 40.0)
}

/// Bounded dominant-frequency history for the stability index.
#[derive(Debug, Clone, Default)]
pub struct FrequencyHistory {
    readings: VecDeque<f64>,
}

impl FrequencyHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading. Zero (no detection) is not recorded.
    pub fn push(&mut self, hz: f64) {
        if hz <= 0.0 || !hz.is_finite() {
            return;
        }
        self.readings.push_back(hz);
        while self.readings.len() > STABILITY_HISTORY_LEN {
            self.readings.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn stability(&self) -> f64 {
        let readings: Vec<f64> = self.readings.iter().copied().collect();
        stats::stability(&readings)
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }
}

/// Tunables for one metrics computation.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisSettings {
    pub sample_rate: f64,
    pub rms_window: usize,
    pub band: FrequencyBand,
}

/// Compute the full vector, appending this tick's dominant frequency to
/// `history` before deriving stability.
pub fn compute_metrics(
    samples: &[f64],
    settings: &AnalysisSettings,
    params: &SignalParams,
    history: &mut FrequencyHistory,
) -> ClinicalMetrics {
    let bins = spectrum::spectrum(samples, settings.sample_rate);
    let peak = spectrum::peak_bin(&bins, settings.band);

    let dominant = spectrum::dominant_frequency_in(samples, settings.sample_rate, settings.band);
    history.push(dominant);

    let rms = stats::windowed_rms(samples, settings.rms_window);

    ClinicalMetrics {
        dominant_frequency_hz: dominant,
        rms_amplitude: rms,
        power_db: power_db(rms),
        regularity_index: regularity_index(params),
        severity_score: severity_score(rms),
        snr_db: snr_db(params),
        peak_to_peak: stats::peak_to_peak(samples),
        bandwidth_hz: peak.map_or(0.0, |p| spectrum::bandwidth(&bins, p, settings.band)),
        stability_index: history.stability(),
        harmonic_ratio_percent: spectrum::harmonic_ratio(&bins, dominant),
    }
}
