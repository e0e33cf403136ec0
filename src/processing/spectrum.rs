//! Windowed DFT and peak analysis over the most recent 256 samples.
//!
//! The transform is a direct O(N^2) DFT. At N = 256 and a 500 ms cadence
//! this is well within budget and keeps the bin layout explicit.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::config::defaults::{
    HALF_POWER_RATIO, HARMONIC_RATIO_MAX_PERCENT, SPECTRUM_WINDOW, TREMOR_BAND_MAX_HZ,
    TREMOR_BAND_MIN_HZ,
};

/// One DFT bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumBin {
    pub frequency_hz: f64,
    pub magnitude: f64,
}

/// Inclusive physiological search band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBand {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl FrequencyBand {
    pub const TREMOR: Self = Self {
        min_hz: TREMOR_BAND_MIN_HZ,
        max_hz: TREMOR_BAND_MAX_HZ,
    };

    pub fn contains(&self, hz: f64) -> bool {
        hz >= self.min_hz && hz <= self.max_hz
    }
}

/// Hann-windowed copy of the last `SPECTRUM_WINDOW` samples.
fn hann_tail(samples: &[f64]) -> Option<Vec<f64>> {
    let n = SPECTRUM_WINDOW;
    if samples.len() < n {
        return None;
    }
    let tail = &samples[samples.len() - n..];
    let denom = (n - 1) as f64;
    Some(
        tail.iter()
            .enumerate()
            .map(|(i, v)| v * 0.5 * (1.0 - (2.0 * PI * i as f64 / denom).cos()))
            .collect(),
    )
}

fn bin_magnitude(windowed: &[f64], k: usize) -> f64 {
    let n = windowed.len();
    let step = 2.0 * PI * k as f64 / n as f64;
    let (re, im) = windowed
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(re, im), (i, v)| {
            let angle = step * i as f64;
            (re + v * angle.cos(), im - v * angle.sin())
        });
    (re * re + im * im).sqrt()
}

fn bin_frequency(k: usize, sample_rate: f64) -> f64 {
    k as f64 * sample_rate / SPECTRUM_WINDOW as f64
}

/// Magnitude spectrum for bins `1..N/2`. Fewer than 256 samples, or a
/// non-positive rate, yields an empty spectrum.
pub fn spectrum(samples: &[f64], sample_rate: f64) -> Vec<SpectrumBin> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Vec::new();
    }
    let Some(windowed) = hann_tail(samples) else {
        return Vec::new();
    };
    (1..SPECTRUM_WINDOW / 2)
        .map(|k| SpectrumBin {
            frequency_hz: bin_frequency(k, sample_rate),
            magnitude: bin_magnitude(&windowed, k),
        })
        .collect()
}

/// Frequency of the strongest bin inside the 4-12 Hz band, or 0 with fewer
/// than 256 samples or no bin in band.
pub fn dominant_frequency(samples: &[f64], sample_rate: f64) -> f64 {
    dominant_frequency_in(samples, sample_rate, FrequencyBand::TREMOR)
}

pub fn dominant_frequency_in(samples: &[f64], sample_rate: f64, band: FrequencyBand) -> f64 {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return 0.0;
    }
    let Some(windowed) = hann_tail(samples) else {
        return 0.0;
    };
    let mut max_mag = 0.0;
    let mut max_bin = 0;
    for k in 1..SPECTRUM_WINDOW / 2 {
        if !band.contains(bin_frequency(k, sample_rate)) {
            continue;
        }
        let mag = bin_magnitude(&windowed, k);
        if mag > max_mag {
            max_mag = mag;
            max_bin = k;
        }
    }
    bin_frequency(max_bin, sample_rate)
}

/// Index of the strongest in-band bin of an already computed spectrum.
pub fn peak_bin(bins: &[SpectrumBin], band: FrequencyBand) -> Option<usize> {
    bins.iter()
        .enumerate()
        .filter(|(_, b)| band.contains(b.frequency_hz) && b.magnitude > 0.0)
        .max_by(|(_, a), (_, b)| a.magnitude.total_cmp(&b.magnitude))
        .map(|(i, _)| i)
}

/// Half-power width around `peak` (an index into `bins`), walking outward
/// while bins stay in band and above 0.707 of the peak magnitude.
/// Width counts the peak bin itself, so a lone peak is one bin wide.
pub fn bandwidth(bins: &[SpectrumBin], peak: usize, band: FrequencyBand) -> f64 {
    let Some(peak_bin) = bins.get(peak) else {
        return 0.0;
    };
    if !band.contains(peak_bin.frequency_hz) || peak_bin.magnitude <= 0.0 {
        return 0.0;
    }
    let threshold = peak_bin.magnitude * HALF_POWER_RATIO;
    let passes = |b: &SpectrumBin| band.contains(b.frequency_hz) && b.magnitude >= threshold;

    let mut lower = peak;
    while lower > 0 && passes(&bins[lower - 1]) {
        lower -= 1;
    }
    let mut upper = peak;
    while upper + 1 < bins.len() && passes(&bins[upper + 1]) {
        upper += 1;
    }

    let bin_width = if bins.len() > 1 {
        bins[1].frequency_hz - bins[0].frequency_hz
    } else {
        bins[0].frequency_hz
    };
    bins[upper].frequency_hz - bins[lower].frequency_hz + bin_width
}

fn nearest_magnitude(bins: &[SpectrumBin], hz: f64) -> f64 {
    bins.iter()
        .min_by(|a, b| (a.frequency_hz - hz).abs().total_cmp(&(b.frequency_hz - hz).abs()))
        .map_or(0.0, |b| b.magnitude)
}

/// `(|2f| + |3f|) / |f| * 100`, clamped to 0-200. Zero when the
/// fundamental is not positive, the spectrum is empty, or `|f|` is zero.
pub fn harmonic_ratio(bins: &[SpectrumBin], fundamental_hz: f64) -> f64 {
    if fundamental_hz <= 0.0 || bins.is_empty() {
        return 0.0;
    }
    let m1 = nearest_magnitude(bins, fundamental_hz);
    if m1 <= 0.0 {
        return 0.0;
    }
    let m2 = nearest_magnitude(bins, 2.0 * fundamental_hz);
    let m3 = nearest_magnitude(bins, 3.0 * fundamental_hz);
    ((m2 + m3) / m1 * 100.0).clamp(0.0, HARMONIC_RATIO_MAX_PERCENT)
}
