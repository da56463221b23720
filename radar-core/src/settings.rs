use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Construction-time knobs for the resource-type scanner.
///
/// All fields carry defaults so partial configuration payloads stay valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// Interval used when a type declares no `check_every` (milliseconds).
    pub default_interval_ms: u64,
    /// Wait between lock attempts of an immediate scan (milliseconds).
    pub lock_retry_interval_ms: u64,
    /// Externally visible base URL, exposed to check containers.
    pub external_url: String,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            default_interval_ms: 60_000,
            lock_retry_interval_ms: 1_000,
            external_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

impl ScannerSettings {
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_external_url(mut self, url: impl Into<String>) -> Self {
        self.external_url = url.into();
        self
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
