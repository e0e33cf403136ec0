//! Config Validation Tests
//!
//! Loads engine configs from TOML files on disk and checks defaults,
//! partial files, round trips and range validation.

use std::io::Write;

use tokio_test::{assert_err, assert_ok};

use tremor_monitor::config::{ConfigError, EngineConfig};
use tremor_monitor::types::ConnectionMode;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn empty_file_yields_defaults() {
    let file = write_config("");
    let config = assert_ok!(EngineConfig::load_from_file(file.path()));
    assert_eq!(config.connection.mode, ConnectionMode::Simulated);
    assert_eq!(config.acquisition.frame_rate_hz, 60.0);
    assert_eq!(config.analysis.interval_ms, 500);
}

#[test]
fn partial_file_overrides_only_named_keys() {
    let file = write_config(
        r#"
[connection]
mode = "peripheral"

[acquisition]
window_seconds = 10.0

[peripheral]
device_name_prefix = "Wrist"
"#,
    );
    let config = EngineConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.connection.mode, ConnectionMode::Peripheral);
    assert_eq!(config.acquisition.window_seconds, 10.0);
    assert_eq!(config.acquisition.frame_rate_hz, 60.0);
    assert_eq!(config.peripheral.device_name_prefix, "Wrist");
}

#[test]
fn saved_config_loads_back_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tremor_config.toml");

    let mut config = EngineConfig::default();
    config.connection.mode = ConnectionMode::CableStub;
    config.latency.alert_ms = 450.0;
    config.server.addr = "0.0.0.0:9000".to_string();
    config.save_to_file(&path).unwrap();

    let loaded = EngineConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded.connection.mode, ConnectionMode::CableStub);
    assert_eq!(loaded.latency.alert_ms, 450.0);
    assert_eq!(loaded.server.addr, "0.0.0.0:9000");
    assert_eq!(loaded.to_toml().unwrap(), config.to_toml().unwrap());
}

#[test]
fn out_of_range_values_are_rejected_together() {
    let file = write_config(
        r#"
[signal]
freq = 20.0

[analysis]
interval_ms = 0
"#,
    );
    match EngineConfig::load_from_file(file.path()) {
        Err(ConfigError::Validation(errors)) => {
            assert_eq!(errors.len(), 2, "errors: {errors:?}");
            assert!(errors.iter().any(|e| e.contains("signal.frequency")));
            assert!(errors.iter().any(|e| e.contains("analysis.interval_ms")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let file = write_config("[acquisition\nframe_rate_hz = ");
    let err = EngineConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
    assert!(err.to_string().contains("parse error"));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = assert_err!(EngineConfig::load_from_file(&dir.path().join("absent.toml")));
    assert!(matches!(err, ConfigError::Io(..)));
}

#[test]
fn latency_window_longer_than_five_samples_is_rejected() {
    let file = write_config("[latency]\nsample_window = 50\n");
    match EngineConfig::load_from_file(file.path()) {
        Err(ConfigError::Validation(errors)) => {
            assert_eq!(errors.len(), 1, "errors: {errors:?}");
            assert!(errors[0].contains("latency.sample_window"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    let file = write_config("[latency]\nsample_window = 3\n");
    let config = assert_ok!(EngineConfig::load_from_file(file.path()));
    assert_eq!(config.latency.sample_window, 3);
}
