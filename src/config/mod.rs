//! Engine Configuration Module
//!
//! Per-deployment configuration loaded from TOML, covering acquisition rates,
//! analysis cadence, peripheral identifiers and latency thresholds.
//!
//! ## Loading Order
//!
//! 1. `TREMOR_CONFIG` environment variable (path to TOML file)
//! 2. `tremor_config.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! The loaded [`EngineConfig`] is handed to the engine at construction;
//! there is no process-wide config singleton.

mod engine_config;
pub mod defaults;

pub use engine_config::*;
