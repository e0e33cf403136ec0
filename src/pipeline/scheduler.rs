//! Periodic feature extraction.
//!
//! Every tick reads the buffer (or its snapshot while frozen), computes the
//! clinical vector and publishes it. Ticks are synchronous and short, so
//! there is no overlap guard.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::acquisition::SampleBuffer;
use crate::config::AnalysisConfig;
use crate::processing::{compute_metrics, AnalysisSettings, FrequencyBand, FrequencyHistory};
use crate::shared::Shared;
use crate::types::{ClinicalMetrics, SignalParams};

/// Latest published vector plus bookkeeping for the API.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub metrics: ClinicalMetrics,
    pub analyses: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct FeatureExtractionScheduler {
    buffer: Shared<SampleBuffer>,
    params: Shared<SignalParams>,
    output: Shared<MetricsSnapshot>,
    history: FrequencyHistory,
    config: AnalysisConfig,
}

impl FeatureExtractionScheduler {
    pub fn new(
        buffer: Shared<SampleBuffer>,
        params: Shared<SignalParams>,
        output: Shared<MetricsSnapshot>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            buffer,
            params,
            output,
            history: FrequencyHistory::new(),
            config,
        }
    }

    /// Run one analysis and publish the result.
    pub fn tick(&mut self) -> ClinicalMetrics {
        let (samples, sample_rate) = {
            let buffer = self.buffer.read();
            (buffer.analysis_samples(), buffer.sample_rate())
        };
        let params = *self.params.read();
        let settings = AnalysisSettings {
            sample_rate,
            rms_window: self.config.rms_window,
            band: FrequencyBand::TREMOR,
        };

        let metrics = compute_metrics(&samples, &settings, &params, &mut self.history);
        self.output.update(|out| {
            out.metrics = metrics;
            out.analyses += 1;
            out.updated_at = Some(Utc::now());
        });
        metrics
    }

    pub async fn run(mut self, cancel: CancellationToken) -> u64 {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut analyses = 0u64;
        info!(interval_ms = self.config.interval_ms, "[FeatureScheduler] Task starting");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[FeatureScheduler] Received shutdown signal after {} analyses", analyses);
                    break;
                }
                _ = interval.tick() => {
                    let m = self.tick();
                    analyses += 1;
                    debug!(
                        dominant_hz = m.dominant_frequency_hz,
                        rms = m.rms_amplitude,
                        severity = m.severity_score,
                        "[FeatureScheduler] Metrics updated"
                    );
                }
            }
        }
        analyses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn scheduler(samples: &[f64]) -> (FeatureExtractionScheduler, Shared<MetricsSnapshot>) {
        let mut buf = SampleBuffer::empty(60.0, 5.0);
        buf.extend(samples.iter().copied());
        let output = Shared::new("metrics", MetricsSnapshot::default());
        let s = FeatureExtractionScheduler::new(
            Shared::new("buffer", buf),
            Shared::new("params", SignalParams::default()),
            output.clone(),
            AnalysisConfig::default(),
        );
        (s, output)
    }

    fn sine(hz: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| 40.0 * (2.0 * PI * hz * i as f64 / 60.0).sin()).collect()
    }

    #[test]
    fn test_tick_publishes_metrics() {
        let (mut s, output) = scheduler(&sine(6.0, 300));
        let m = s.tick();
        assert!((m.dominant_frequency_hz - 6.0).abs() < 0.5);
        let out = output.snapshot();
        assert_eq!(out.analyses, 1);
        assert!(out.updated_at.is_some());
        assert_eq!(out.metrics, m);
    }

    #[test]
    fn test_stability_appears_after_five_ticks() {
        let (mut s, _) = scheduler(&sine(6.0, 300));
        for _ in 0..4 {
            assert_eq!(s.tick().stability_index, 0.0);
        }
        assert!(s.tick().stability_index > 90.0);
    }

    #[test]
    fn test_short_buffer_yields_zero_frequency() {
        let (mut s, _) = scheduler(&sine(6.0, 100));
        let m = s.tick();
        assert_eq!(m.dominant_frequency_hz, 0.0);
        assert_eq!(m.bandwidth_hz, 0.0);
    }

    #[test]
    fn test_frozen_snapshot_is_analysed() {
        let (mut s, _) = scheduler(&sine(6.0, 300));
        {
            let mut b = s.buffer.write();
            b.capture_snapshot();
            b.freeze();
            b.extend(std::iter::repeat(0.0).take(300));
        }
        assert!(s.tick().rms_amplitude > 1.0);
    }
}
