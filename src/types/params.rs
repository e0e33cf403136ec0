//! Synthetic signal parameters with range clamping.

use serde::{Deserialize, Serialize};

use crate::config::defaults::{TREMOR_BAND_MAX_HZ, TREMOR_BAND_MIN_HZ};

pub const AMPLITUDE_MAX: f64 = 100.0;
pub const NOISE_MAX: f64 = 100.0;

/// Oscillator settings. Serialized with the short wire names the peripheral
/// firmware expects (`freq`, `amp`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalParams {
    /// Carrier frequency (Hz), integer within the tremor band.
    #[serde(rename = "freq", alias = "frequency", default = "default_frequency")]
    pub frequency: f64,
    #[serde(rename = "amp", alias = "amplitude", default = "default_amplitude")]
    pub amplitude: f64,
    #[serde(default = "default_noise")]
    pub noise: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_frequency() -> f64 { 5.0 }
fn default_amplitude() -> f64 { 40.0 }
fn default_noise() -> f64 { 12.0 }
fn default_enabled() -> bool { true }

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            frequency: default_frequency(),
            amplitude: default_amplitude(),
            noise: default_noise(),
            enabled: default_enabled(),
        }
    }
}

/// Individually adjustable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKey {
    #[serde(alias = "freq")]
    Frequency,
    #[serde(alias = "amp")]
    Amplitude,
    Noise,
}

impl SignalParams {
    /// Set one parameter, clamping to its range. Non-finite input is ignored.
    pub fn set(&mut self, key: ParamKey, value: f64) {
        if !value.is_finite() {
            return;
        }
        match key {
            ParamKey::Frequency => self.frequency = clamp_frequency(value),
            ParamKey::Amplitude => self.amplitude = value.clamp(0.0, AMPLITUDE_MAX),
            ParamKey::Noise => self.noise = value.clamp(0.0, NOISE_MAX),
        }
    }

    /// Copy with every field brought into range.
    pub fn clamped(self) -> Self {
        let mut out = Self {
            enabled: self.enabled,
            ..Self::default()
        };
        // Non-finite fields keep their defaults
        out.set(ParamKey::Frequency, self.frequency);
        out.set(ParamKey::Amplitude, self.amplitude);
        out.set(ParamKey::Noise, self.noise);
        out
    }

    /// Amplitude actually driven into the carrier.
    pub fn effective_amplitude(&self) -> f64 {
        if self.enabled {
            self.amplitude
        } else {
            0.0
        }
    }
}

fn clamp_frequency(value: f64) -> f64 {
    value.round().clamp(TREMOR_BAND_MIN_HZ, TREMOR_BAND_MAX_HZ)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_is_rounded_then_clamped() {
        let mut p = SignalParams::default();
        p.set(ParamKey::Frequency, 6.6);
        assert_eq!(p.frequency, 7.0);
        p.set(ParamKey::Frequency, 2.0);
        assert_eq!(p.frequency, 4.0);
        p.set(ParamKey::Frequency, 40.0);
        assert_eq!(p.frequency, 12.0);
    }

    #[test]
    fn test_amplitude_and_noise_clamped() {
        let mut p = SignalParams::default();
        p.set(ParamKey::Amplitude, 250.0);
        p.set(ParamKey::Noise, -3.0);
        assert_eq!(p.amplitude, 100.0);
        assert_eq!(p.noise, 0.0);
    }

    #[test]
    fn test_nan_input_keeps_previous_value() {
        let mut p = SignalParams::default();
        p.set(ParamKey::Amplitude, f64::NAN);
        assert_eq!(p.amplitude, 40.0);
    }

    #[test]
    fn test_clamped_copy() {
        let raw = SignalParams { frequency: 3.2, amplitude: 120.0, noise: 50.0, enabled: false };
        let p = raw.clamped();
        assert_eq!(p.frequency, 4.0);
        assert_eq!(p.amplitude, 100.0);
        assert_eq!(p.noise, 50.0);
        assert!(!p.enabled);
        assert_eq!(p.effective_amplitude(), 0.0);
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(SignalParams::default()).unwrap();
        assert_eq!(json["freq"], 5.0);
        assert_eq!(json["amp"], 40.0);
        let parsed: SignalParams =
            serde_json::from_str(r#"{"frequency": 8, "amplitude": 10}"#).unwrap();
        assert_eq!(parsed.frequency, 8.0);
        assert_eq!(parsed.noise, 12.0);
    }
}
