//! Engine Configuration - acquisition, analysis and link tuning as TOML values
//!
//! Each section implements `Default` with the values in [`super::defaults`],
//! so an empty or missing file yields the stock behaviour.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use super::defaults;
use crate::types::{ConnectionMode, IndicatorBand, MetricKind, SignalParams};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TREMOR_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "tremor_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one monitoring engine.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$TREMOR_CONFIG` env var
/// 2. `./tremor_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Link mode at startup
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Frame driver and buffer sizing
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Initial synthetic signal parameters
    #[serde(default)]
    pub signal: SignalParams,

    /// Feature extraction tuning
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Peripheral identifiers
    #[serde(default)]
    pub peripheral: PeripheralConfig,

    /// Latency probe thresholds and timing
    #[serde(default)]
    pub latency: LatencyConfig,

    /// Simulated link behaviour
    #[serde(default)]
    pub simulated_link: SimulatedLinkConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Indicator thresholds served with the metrics view
    #[serde(default)]
    pub indicators: IndicatorConfig,
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$TREMOR_CONFIG` environment variable
    /// 2. `./tremor_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded engine config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded engine config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path and validate it.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Engine config saved");
        Ok(())
    }

    /// Validate every section, collecting all problems before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let acq = &self.acquisition;
        Self::check_positive(acq.frame_rate_hz, "acquisition.frame_rate_hz", &mut errors);
        Self::check_positive(acq.window_seconds, "acquisition.window_seconds", &mut errors);
        if acq.telemetry_channel_capacity == 0 {
            errors.push("acquisition.telemetry_channel_capacity must be > 0".to_string());
        }

        let p = &self.signal;
        if !(defaults::TREMOR_BAND_MIN_HZ..=defaults::TREMOR_BAND_MAX_HZ).contains(&p.frequency) {
            errors.push(format!("signal.frequency must be within 4-12 Hz (got {})", p.frequency));
        }
        if !(0.0..=100.0).contains(&p.amplitude) {
            errors.push(format!("signal.amplitude must be within 0-100 (got {})", p.amplitude));
        }
        if !(0.0..=100.0).contains(&p.noise) {
            errors.push(format!("signal.noise must be within 0-100 (got {})", p.noise));
        }

        let a = &self.analysis;
        if a.interval_ms == 0 {
            errors.push("analysis.interval_ms must be > 0".to_string());
        }
        if a.rms_window == 0 {
            errors.push("analysis.rms_window must be > 0".to_string());
        }

        let per = &self.peripheral;
        if per.device_name_prefix.trim().is_empty() {
            errors.push("peripheral.device_name_prefix must not be empty".to_string());
        }
        if per.control_char_uuid == per.telemetry_char_uuid {
            errors.push("peripheral.control_char_uuid and telemetry_char_uuid must differ".to_string());
        }

        let l = &self.latency;
        Self::check_escalation(l.warning_ms, l.alert_ms, "latency", &mut errors);
        if l.test_interval_ms == 0 {
            errors.push("latency.test_interval_ms must be > 0".to_string());
        }
        if !(1..=defaults::LATENCY_TEST_SAMPLE_WINDOW).contains(&l.sample_window) {
            errors.push(format!(
                "latency.sample_window must be within 1-{} (got {})",
                defaults::LATENCY_TEST_SAMPLE_WINDOW,
                l.sample_window
            ));
        }

        let s = &self.simulated_link;
        Self::check_escalation(s.latency_min_ms, s.latency_max_ms, "simulated_link.latency", &mut errors);
        if !(0.0..=100.0).contains(&s.per_max) {
            errors.push(format!("simulated_link.per_max must be within 0-100 (got {})", s.per_max));
        }

        for o in &self.indicators.bands {
            let values = [o.normal_min, o.normal_max, o.alert_min, o.alert_max];
            if values.iter().any(|v| !v.is_finite()) {
                errors.push(format!("indicators.{:?} thresholds must be finite", o.metric));
            } else if !(o.alert_min <= o.normal_min && o.normal_min <= o.normal_max && o.normal_max <= o.alert_max) {
                errors.push(format!(
                    "indicators.{:?} must satisfy alert_min <= normal_min <= normal_max <= alert_max",
                    o.metric
                ));
            }
        }

        if self.server.addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("server.addr is not a socket address: {}", self.server.addr));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} must be a positive number (got {value})"));
        }
    }

    fn check_escalation(low: f64, high: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass
        if !low.is_finite() || !high.is_finite() {
            errors.push(format!("{name}: values must be finite (got {low}, {high})"));
            return;
        }
        if high < low {
            errors.push(format!("{name}: upper ({high:.1}) must be >= lower ({low:.1})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({path}): {1}", path = .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({path}): {1}", path = .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {details}", details = .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Connection
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Link backend selected at startup.
    #[serde(default)]
    pub mode: ConnectionMode,
}

// ============================================================================
// Acquisition
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Frame driver rate (Hz). Seeds the sample-rate estimate.
    #[serde(default = "default_frame_rate")]
    pub frame_rate_hz: f64,

    /// Visible waveform window (seconds).
    #[serde(default = "default_window_seconds")]
    pub window_seconds: f64,

    /// Start with a zero-filled buffer instead of an empty one.
    #[serde(default = "default_true")]
    pub prefill_buffer: bool,

    /// Inbound telemetry queue depth (samples).
    #[serde(default = "default_telemetry_capacity")]
    pub telemetry_channel_capacity: usize,
}

fn default_frame_rate() -> f64 { defaults::SIM_SAMPLE_RATE_HZ }
fn default_window_seconds() -> f64 { defaults::DEFAULT_WINDOW_SECONDS }
fn default_true() -> bool { true }
fn default_telemetry_capacity() -> usize { defaults::TELEMETRY_CHANNEL_CAPACITY }

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: default_frame_rate(),
            window_seconds: default_window_seconds(),
            prefill_buffer: true,
            telemetry_channel_capacity: default_telemetry_capacity(),
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Feature extraction cadence (ms).
    #[serde(default = "default_analysis_interval")]
    pub interval_ms: u64,

    /// Samples used for the RMS amplitude readout.
    #[serde(default = "default_rms_window")]
    pub rms_window: usize,
}

fn default_analysis_interval() -> u64 { defaults::ANALYSIS_INTERVAL_MS }
fn default_rms_window() -> usize { defaults::RMS_WINDOW }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_analysis_interval(),
            rms_window: default_rms_window(),
        }
    }
}

// ============================================================================
// Peripheral
// ============================================================================

/// GATT identifiers of the sensor. Configuration, not protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeripheralConfig {
    #[serde(default = "default_name_prefix")]
    pub device_name_prefix: String,

    #[serde(default = "default_service_uuid")]
    pub service_uuid: Uuid,

    #[serde(default = "default_control_uuid")]
    pub control_char_uuid: Uuid,

    #[serde(default = "default_telemetry_uuid")]
    pub telemetry_char_uuid: Uuid,
}

fn default_name_prefix() -> String { defaults::DEVICE_NAME_PREFIX.to_string() }
fn default_service_uuid() -> Uuid { Uuid::from_u128(0x0000fff0_0000_1000_8000_00805f9b34fb) }
fn default_control_uuid() -> Uuid { Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb) }
fn default_telemetry_uuid() -> Uuid { Uuid::from_u128(0x0000fff2_0000_1000_8000_00805f9b34fb) }

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            device_name_prefix: default_name_prefix(),
            service_uuid: default_service_uuid(),
            control_char_uuid: default_control_uuid(),
            telemetry_char_uuid: default_telemetry_uuid(),
        }
    }
}

// ============================================================================
// Latency
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyConfig {
    #[serde(default = "default_latency_warning")]
    pub warning_ms: f64,

    #[serde(default = "default_latency_alert")]
    pub alert_ms: f64,

    /// Probe ping interval (ms).
    #[serde(default = "default_latency_interval")]
    pub test_interval_ms: u64,

    /// Rolling window of probe round-trips, at most five.
    #[serde(default = "default_latency_window")]
    pub sample_window: usize,
}

fn default_latency_warning() -> f64 { defaults::LATENCY_WARNING_MS }
fn default_latency_alert() -> f64 { defaults::LATENCY_ALERT_MS }
fn default_latency_interval() -> u64 { defaults::LATENCY_TEST_INTERVAL_MS }
fn default_latency_window() -> usize { defaults::LATENCY_TEST_SAMPLE_WINDOW }

impl LatencyConfig {
    /// How long a probe ping may stay unanswered before a timeout warning.
    pub fn probe_timeout_ms(&self) -> u64 {
        // alert_ms is validated finite and non-negative in practice
        let alert = self.alert_ms.max(0.0).round() as u64;
        alert.max(self.test_interval_ms)
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            warning_ms: default_latency_warning(),
            alert_ms: default_latency_alert(),
            test_interval_ms: default_latency_interval(),
            sample_window: default_latency_window(),
        }
    }
}

// ============================================================================
// Simulated Link
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedLinkConfig {
    #[serde(default = "default_sim_connect_delay")]
    pub connect_delay_ms: u64,

    #[serde(default = "default_sim_metrics_interval")]
    pub metrics_interval_ms: u64,

    #[serde(default = "default_sim_latency_min")]
    pub latency_min_ms: f64,

    #[serde(default = "default_sim_latency_max")]
    pub latency_max_ms: f64,

    /// Upper bound of the reported packet error rate (percent).
    #[serde(default = "default_sim_per_max")]
    pub per_max: f64,
}

fn default_sim_connect_delay() -> u64 { defaults::SIMULATED_CONNECT_DELAY_MS }
fn default_sim_metrics_interval() -> u64 { defaults::SIMULATED_METRICS_INTERVAL_MS }
fn default_sim_latency_min() -> f64 { defaults::SIMULATED_LATENCY_MIN_MS }
fn default_sim_latency_max() -> f64 { defaults::SIMULATED_LATENCY_MAX_MS }
fn default_sim_per_max() -> f64 { defaults::SIMULATED_PER_MAX }

impl Default for SimulatedLinkConfig {
    fn default() -> Self {
        Self {
            connect_delay_ms: default_sim_connect_delay(),
            metrics_interval_ms: default_sim_metrics_interval(),
            latency_min_ms: default_sim_latency_min(),
            latency_max_ms: default_sim_latency_max(),
            per_max: default_sim_per_max(),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server bind address.
    ///
    /// Can be overridden by `TREMOR_SERVER_ADDR` env var or `--addr` CLI flag.
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

// ============================================================================
// Indicators
// ============================================================================

/// Overrides of the stock indicator bands, one entry per readout:
///
/// ```toml
/// [[indicators.bands]]
/// metric = "dominant_frequency"
/// normal_min = 4.0
/// normal_max = 7.0
/// alert_min = 3.0
/// alert_max = 10.0
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default)]
    pub bands: Vec<IndicatorOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorOverride {
    pub metric: MetricKind,
    pub normal_min: f64,
    pub normal_max: f64,
    pub alert_min: f64,
    pub alert_max: f64,
}

impl IndicatorConfig {
    /// Configured band for `kind`, else the stock one. Last entry wins.
    pub fn band(&self, kind: MetricKind) -> IndicatorBand {
        self.bands
            .iter()
            .rev()
            .find(|o| o.metric == kind)
            .map_or_else(
                || kind.default_band(),
                |o| IndicatorBand {
                    normal_min: o.normal_min,
                    normal_max: o.normal_max,
                    alert_min: o.alert_min,
                    alert_max: o.alert_max,
                },
            )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: EngineConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config.connection.mode, ConnectionMode::Simulated);
        assert_eq!(config.acquisition.frame_rate_hz, 60.0);
        assert_eq!(config.acquisition.window_seconds, 5.0);
        assert_eq!(config.analysis.interval_ms, 500);
        assert_eq!(config.latency.alert_ms, 300.0);
        assert_eq!(config.signal.frequency, 5.0);
        assert_eq!(
            config.peripheral.service_uuid.to_string(),
            "0000fff0-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[connection]
mode = "peripheral"

[peripheral]
device_name_prefix = "Bench"
telemetry_char_uuid = "0000aaa2-0000-1000-8000-00805f9b34fb"

[latency]
warning_ms = 80.0
"#;
        let config: EngineConfig = toml::from_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.connection.mode, ConnectionMode::Peripheral);
        assert_eq!(config.peripheral.device_name_prefix, "Bench");
        assert_eq!(
            config.peripheral.telemetry_char_uuid.to_string(),
            "0000aaa2-0000-1000-8000-00805f9b34fb"
        );
        // Non-overridden values retain defaults
        assert_eq!(config.latency.warning_ms, 80.0);
        assert_eq!(config.latency.alert_ms, 300.0);
        assert_eq!(config.acquisition.frame_rate_hz, 60.0);
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = EngineConfig::default();
        config.latency.warning_ms = 500.0;
        config.acquisition.window_seconds = 0.0;
        config.server.addr = "not an address".to_string();

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 3, "errors: {errors:?}");
                assert!(errors.iter().any(|e| e.contains("latency")));
                assert!(errors.iter().any(|e| e.contains("window_seconds")));
                assert!(errors.iter().any(|e| e.contains("server.addr")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_indicator_overrides_parse_and_replace_stock_band() {
        let toml_str = r#"
[[indicators.bands]]
metric = "stability"
normal_min = 50.0
normal_max = 100.0
alert_min = 10.0
alert_max = 100.0
"#;
        let config: EngineConfig = toml::from_str(toml_str).expect("indicator TOML should parse");
        assert!(config.validate().is_ok());
        let band = config.indicators.band(MetricKind::Stability);
        assert_eq!(band.normal_min, 50.0);
        assert_eq!(band.alert_min, 10.0);
        assert_eq!(
            config.indicators.band(MetricKind::Snr),
            MetricKind::Snr.default_band()
        );
    }

    #[test]
    fn test_inverted_indicator_band_rejected() {
        let mut config = EngineConfig::default();
        config.indicators.bands.push(IndicatorOverride {
            metric: MetricKind::Power,
            normal_min: 10.0,
            normal_max: -20.0,
            alert_min: -40.0,
            alert_max: 30.0,
        });
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("indicators.Power"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let mut config = EngineConfig::default();
        config.latency.alert_ms = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_probe_timeout_is_max_of_alert_and_interval() {
        let mut latency = LatencyConfig::default();
        assert_eq!(latency.probe_timeout_ms(), 1_000);
        latency.alert_ms = 1_500.0;
        assert_eq!(latency.probe_timeout_ms(), 1_500);
    }

    #[test]
    fn test_toml_round_trip_preserves_overrides() {
        let mut config = EngineConfig::default();
        config.acquisition.window_seconds = 8.0;
        config.connection.mode = ConnectionMode::CableStub;
        let text = config.to_toml().expect("serialize");
        let parsed: EngineConfig = toml::from_str(&text).expect("reparse");
        assert_eq!(parsed.acquisition.window_seconds, 8.0);
        assert_eq!(parsed.connection.mode, ConnectionMode::CableStub);
    }
}
