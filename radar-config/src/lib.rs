//! Configuration loading and tracing setup for the Radar scanner.
//!
//! Scanner settings come from `$RADAR_CONFIG_PATH`, inline JSON in
//! `$RADAR_CONFIG_JSON`, a `radar.toml`/`radar.json` next to the process, or
//! built-in defaults, in that order.

pub mod loader;
pub mod telemetry;

pub use loader::{
    ConfigValidationError, LoggingConfig, ScannerConfig, ScannerConfigSource,
};
