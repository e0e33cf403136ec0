//! Latency classification for the status indicator.

use crate::config::LatencyConfig;
use crate::types::{LatencyLevel, LatencyWarning};

/// Raised when a probe ping goes unanswered past its timeout.
pub const PROBE_TIMEOUT_MESSAGE: &str = "Latency test timed out, no response from device.";

/// Hidden below the warning threshold, when unknown, or when disconnected.
pub fn classify(latency_ms: Option<f64>, connected: bool, cfg: &LatencyConfig) -> LatencyWarning {
    let Some(latency) = latency_ms.filter(|_| connected) else {
        return LatencyWarning::hidden();
    };
    if latency >= cfg.alert_ms {
        LatencyWarning::new(
            LatencyLevel::Alert,
            format!("High latency detected ({} ms).", latency.round()),
        )
    } else if latency >= cfg.warning_ms {
        LatencyWarning::new(
            LatencyLevel::Warning,
            format!("Latency above target ({} ms).", latency.round()),
        )
    } else {
        LatencyWarning::hidden()
    }
}

pub fn probe_timeout_warning() -> LatencyWarning {
    LatencyWarning::new(LatencyLevel::Alert, PROBE_TIMEOUT_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        let cfg = LatencyConfig::default();
        assert_eq!(classify(Some(50.0), true, &cfg).level, LatencyLevel::Hidden);
        assert_eq!(classify(Some(150.0), true, &cfg).level, LatencyLevel::Warning);
        assert_eq!(classify(Some(350.0), true, &cfg).level, LatencyLevel::Alert);
        assert_eq!(classify(None, true, &cfg).level, LatencyLevel::Hidden);
        assert_eq!(classify(Some(350.0), false, &cfg).level, LatencyLevel::Hidden);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let cfg = LatencyConfig::default();
        assert_eq!(classify(Some(100.0), true, &cfg).level, LatencyLevel::Warning);
        assert_eq!(classify(Some(300.0), true, &cfg).level, LatencyLevel::Alert);
    }

    #[test]
    fn test_messages_round_latency() {
        let cfg = LatencyConfig::default();
        assert_eq!(classify(Some(149.6), true, &cfg).message, "Latency above target (150 ms).");
        assert_eq!(classify(Some(301.2), true, &cfg).message, "High latency detected (301 ms).");
        assert!(classify(Some(10.0), true, &cfg).message.is_empty());
    }
}
