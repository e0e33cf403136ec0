//! Time-domain statistics over sample windows.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::defaults::{STABILITY_HISTORY_LEN, STABILITY_MIN_READINGS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub avg: f64,
    pub rms: f64,
    /// Largest absolute value.
    pub peak: f64,
    /// `max(0, rms - |avg|)`
    pub noise_floor: f64,
}

/// Mean, RMS, absolute peak and noise floor. Empty input yields zeros.
pub fn summary(samples: &[f64]) -> SignalSummary {
    if samples.is_empty() {
        return SignalSummary::default();
    }
    let n = samples.len() as f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut peak: f64 = 0.0;
    for &v in samples {
        sum += v;
        sum_sq += v * v;
        peak = peak.max(v.abs());
    }
    let avg = sum / n;
    let rms = (sum_sq / n).sqrt();
    SignalSummary {
        avg,
        rms,
        peak,
        noise_floor: (rms - avg.abs()).max(0.0),
    }
}

/// RMS of the last `window` samples (all of them if fewer). Empty yields 0.
pub fn windowed_rms(samples: &[f64], window: usize) -> f64 {
    let start = samples.len().saturating_sub(window);
    let tail = &samples[start..];
    if tail.is_empty() {
        return 0.0;
    }
    (tail.iter().map(|v| v * v).sum::<f64>() / tail.len() as f64).sqrt()
}

/// Max minus min. Empty yields 0.
pub fn peak_to_peak(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    max - min
}

/// Frequency stability score, `100 - 100 * cv` clamped to 0-100, over the
/// last 30 readings. Needs at least 5 readings and a positive mean.
pub fn stability(history: &[f64]) -> f64 {
    if history.len() < STABILITY_MIN_READINGS {
        return 0.0;
    }
    let start = history.len().saturating_sub(STABILITY_HISTORY_LEN);
    let recent = &history[start..];
    let mean = recent.iter().mean();
    if !mean.is_finite() || mean <= 0.0 {
        return 0.0;
    }
    let std_dev = recent.iter().population_std_dev();
    (100.0 - 100.0 * (std_dev / mean)).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_of_zeros() {
        assert_eq!(summary(&[0.0, 0.0, 0.0]), SignalSummary::default());
        assert_eq!(summary(&[]), SignalSummary::default());
    }

    #[test]
    fn test_summary_mixed_signs() {
        let s = summary(&[3.0, -4.0]);
        assert!((s.rms - 3.535_533_905_9).abs() < 1e-9);
        assert_eq!(s.peak, 4.0);
        assert_eq!(s.avg, -0.5);
        assert!((s.noise_floor - (s.rms - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_noise_floor_never_negative() {
        let s = summary(&[2.0, 2.0, 2.0]);
        assert_eq!(s.noise_floor, 0.0);
    }

    #[test]
    fn test_windowed_rms_uses_tail() {
        let samples = [100.0, 100.0, 3.0, -4.0];
        assert!((windowed_rms(&samples, 2) - 3.535_533_905_9).abs() < 1e-9);
        assert!((windowed_rms(&[3.0, -4.0], 20) - 3.535_533_905_9).abs() < 1e-9);
        assert_eq!(windowed_rms(&[], 20), 0.0);
        assert_eq!(windowed_rms(&samples, 0), 0.0);
    }

    #[test]
    fn test_peak_to_peak() {
        assert_eq!(peak_to_peak(&[-3.0, 1.0, 7.0]), 10.0);
        assert_eq!(peak_to_peak(&[]), 0.0);
    }

    #[test]
    fn test_stability_requires_five_readings() {
        assert_eq!(stability(&[5.0, 9.0, 1.0, 12.0]), 0.0);
        assert_eq!(stability(&[5.0; 4]), 0.0);
        assert_eq!(stability(&[5.0; 5]), 100.0);
    }

    #[test]
    fn test_stability_penalises_variation() {
        let steady = stability(&[5.0, 5.1, 4.9, 5.0, 5.0, 5.1]);
        let erratic = stability(&[4.0, 12.0, 4.0, 12.0, 4.0, 12.0]);
        assert!(steady > 95.0);
        assert!(erratic < steady);
        assert!(erratic >= 0.0);
    }

    #[test]
    fn test_stability_only_considers_last_thirty() {
        let mut history = vec![100.0, 1.0, 50.0];
        history.extend(std::iter::repeat(6.0).take(30));
        assert_eq!(stability(&history), 100.0);
    }
}
