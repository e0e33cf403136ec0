//! Clinical feature vector and traffic-light indicator bands.

use serde::{Deserialize, Serialize};

/// Output of one feature-extraction tick.
///
/// These are illustrative heuristics for a demo dashboard, not validated
/// clinical instruments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalMetrics {
    pub dominant_frequency_hz: f64,
    pub rms_amplitude: f64,
    pub power_db: f64,
    /// 0-100
    pub regularity_index: f64,
    /// 0-4 ordinal, step function of `rms_amplitude`
    pub severity_score: u8,
    pub snr_db: f64,
    pub peak_to_peak: f64,
    pub bandwidth_hz: f64,
    /// 0-100, zero until enough frequency history exists
    pub stability_index: f64,
    pub harmonic_ratio_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    DominantFrequency,
    RmsAmplitude,
    Power,
    Regularity,
    Severity,
    Snr,
    PeakToPeak,
    Bandwidth,
    Stability,
    HarmonicRatio,
}

impl MetricKind {
    pub const ALL: [MetricKind; 10] = [
        Self::DominantFrequency,
        Self::RmsAmplitude,
        Self::Power,
        Self::Regularity,
        Self::Severity,
        Self::Snr,
        Self::PeakToPeak,
        Self::Bandwidth,
        Self::Stability,
        Self::HarmonicRatio,
    ];

    /// Stock dashboard bands. Views may supply their own.
    pub fn default_band(self) -> IndicatorBand {
        let (normal_min, normal_max, alert_min, alert_max) = match self {
            Self::DominantFrequency => (4.0, 6.0, 3.0, 8.0),
            Self::RmsAmplitude => (0.0, 30.0, 0.0, 100.0),
            Self::Power => (-20.0, 10.0, -40.0, 30.0),
            Self::Regularity => (60.0, 100.0, 0.0, 100.0),
            Self::Severity => (0.0, 1.0, 0.0, 4.0),
            Self::Snr => (15.0, 40.0, -10.0, 40.0),
            Self::PeakToPeak => (0.0, 60.0, 0.0, 120.0),
            Self::Bandwidth => (0.0, 2.0, 0.0, 6.0),
            Self::Stability => (70.0, 100.0, 0.0, 100.0),
            Self::HarmonicRatio => (0.0, 60.0, 0.0, 150.0),
        };
        IndicatorBand { normal_min, normal_max, alert_min, alert_max }
    }
}

impl ClinicalMetrics {
    pub fn value(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::DominantFrequency => self.dominant_frequency_hz,
            MetricKind::RmsAmplitude => self.rms_amplitude,
            MetricKind::Power => self.power_db,
            MetricKind::Regularity => self.regularity_index,
            MetricKind::Severity => f64::from(self.severity_score),
            MetricKind::Snr => self.snr_db,
            MetricKind::PeakToPeak => self.peak_to_peak,
            MetricKind::Bandwidth => self.bandwidth_hz,
            MetricKind::Stability => self.stability_index,
            MetricKind::HarmonicRatio => self.harmonic_ratio_percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorLevel {
    Normal,
    Warning,
    Alert,
}

/// Thresholds for one readout, supplied by the view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorBand {
    pub normal_min: f64,
    pub normal_max: f64,
    pub alert_min: f64,
    pub alert_max: f64,
}

impl IndicatorBand {
    /// Normal inside the normal range, alert outside the alert range,
    /// warning in between.
    pub fn classify(&self, value: f64) -> IndicatorLevel {
        if value >= self.normal_min && value <= self.normal_max {
            IndicatorLevel::Normal
        } else if value < self.alert_min || value > self.alert_max {
            IndicatorLevel::Alert
        } else {
            IndicatorLevel::Warning
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bands() {
        let band = MetricKind::DominantFrequency.default_band();
        assert_eq!(band.classify(5.0), IndicatorLevel::Normal);
        assert_eq!(band.classify(7.0), IndicatorLevel::Warning);
        assert_eq!(band.classify(3.5), IndicatorLevel::Warning);
        assert_eq!(band.classify(9.0), IndicatorLevel::Alert);
        assert_eq!(band.classify(0.0), IndicatorLevel::Alert);
    }

    #[test]
    fn test_band_edges_are_inclusive() {
        let band = MetricKind::Stability.default_band();
        assert_eq!(band.classify(70.0), IndicatorLevel::Normal);
        assert_eq!(band.classify(0.0), IndicatorLevel::Warning);
    }

    #[test]
    fn test_value_lookup_covers_every_kind() {
        let m = ClinicalMetrics { severity_score: 3, snr_db: 12.5, ..Default::default() };
        assert_eq!(m.value(MetricKind::Severity), 3.0);
        assert_eq!(m.value(MetricKind::Snr), 12.5);
        assert_eq!(MetricKind::ALL.len(), 10);
    }
}
