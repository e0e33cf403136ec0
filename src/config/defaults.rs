//! System-wide default constants.
//!
//! Centralises the magic numbers of the acquisition and link layers.
//! Grouped by subsystem for easy discovery. Every value here is also the
//! serde default of the matching [`EngineConfig`](super::EngineConfig) field.

// ============================================================================
// Acquisition
// ============================================================================

/// Nominal frame rate of the acquisition driver (Hz).
///
/// Also the starting point of the smoothed sample-rate estimate.
pub const SIM_SAMPLE_RATE_HZ: f64 = 60.0;

/// Default visible waveform window (seconds).
pub const DEFAULT_WINDOW_SECONDS: f64 = 5.0;

/// Smallest buffer capacity regardless of rate and window.
pub const MIN_BUFFER_CAPACITY: usize = 60;

/// Weight kept from the previous estimate in the sample-rate EMA.
pub const SAMPLE_RATE_SMOOTHING: f64 = 0.9;

/// Uniform noise is scaled by this factor before being added to the carrier.
pub const NOISE_SCALE: f64 = 0.35;

/// Inbound telemetry queue depth (samples) between the link and the buffer.
pub const TELEMETRY_CHANNEL_CAPACITY: usize = 1_024;

// ============================================================================
// Analysis
// ============================================================================

/// Feature extraction cadence (milliseconds).
pub const ANALYSIS_INTERVAL_MS: u64 = 500;

/// Number of most-recent samples fed to the DFT.
pub const SPECTRUM_WINDOW: usize = 256;

/// Physiological tremor search band, lower edge (Hz).
pub const TREMOR_BAND_MIN_HZ: f64 = 4.0;

/// Physiological tremor search band, upper edge (Hz).
pub const TREMOR_BAND_MAX_HZ: f64 = 12.0;

/// Window used for the RMS amplitude readout (samples).
pub const RMS_WINDOW: usize = 20;

/// Dominant-frequency history kept for the stability index.
pub const STABILITY_HISTORY_LEN: usize = 30;

/// Minimum history entries before stability is reported.
pub const STABILITY_MIN_READINGS: usize = 5;

/// Half-power point relative to the peak magnitude.
pub const HALF_POWER_RATIO: f64 = 0.707;

/// Upper clamp of the harmonic ratio (percent).
pub const HARMONIC_RATIO_MAX_PERCENT: f64 = 200.0;

/// Power readout floor (dB).
pub const POWER_FLOOR_DB: f64 = -40.0;

// ============================================================================
// Peripheral link
// ============================================================================

/// Advertised name prefix used to filter device discovery.
pub const DEVICE_NAME_PREFIX: &str = "Tremor";

/// Primary GATT service.
pub const SERVICE_UUID: &str = "0000fff0-0000-1000-8000-00805f9b34fb";

/// Writable control characteristic (commands out).
pub const CONTROL_CHAR_UUID: &str = "0000fff1-0000-1000-8000-00805f9b34fb";

/// Notifying telemetry characteristic (samples in).
pub const TELEMETRY_CHAR_UUID: &str = "0000fff2-0000-1000-8000-00805f9b34fb";

// ============================================================================
// Latency probe
// ============================================================================

/// Latency at or above this is shown as a warning (ms).
pub const LATENCY_WARNING_MS: f64 = 100.0;

/// Latency at or above this is shown as an alert (ms).
pub const LATENCY_ALERT_MS: f64 = 300.0;

/// Interval between probe pings (ms).
pub const LATENCY_TEST_INTERVAL_MS: u64 = 1_000;

/// Rolling window of recorded probe round-trips.
pub const LATENCY_TEST_SAMPLE_WINDOW: usize = 5;

// ============================================================================
// Simulated link
// ============================================================================

/// Delay before the simulated link reports connected (ms).
pub const SIMULATED_CONNECT_DELAY_MS: u64 = 800;

/// Interval between simulated latency/PER refreshes (ms).
pub const SIMULATED_METRICS_INTERVAL_MS: u64 = 2_000;

/// Simulated latency range, lower bound (ms).
pub const SIMULATED_LATENCY_MIN_MS: f64 = 10.0;

/// Simulated latency range, upper bound (ms).
pub const SIMULATED_LATENCY_MAX_MS: f64 = 80.0;

/// Simulated packet error rate upper bound (percent).
pub const SIMULATED_PER_MAX: f64 = 0.5;

// ============================================================================
// Sequences & recording
// ============================================================================

/// Local sequence playback tick (ms).
pub const SEQUENCE_TICK_MS: u64 = 200;

/// Session recorder sampling tick (ms).
pub const RECORDER_TICK_MS: u64 = 200;

/// Maximum samples kept by the session recorder.
pub const RECORDER_MAX_SAMPLES: usize = 600;

// ============================================================================
// Server
// ============================================================================

/// Default HTTP bind address.
pub const SERVER_ADDR: &str = "127.0.0.1:8090";
