use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use radar_core::ScannerSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_PATH_VAR: &str = "RADAR_CONFIG_PATH";
pub const CONFIG_JSON_VAR: &str = "RADAR_CONFIG_JSON";

const DEFAULT_FILES: &[&str] = &[
    "radar.toml",
    "radar.json",
    "config/radar.toml",
    "config/radar.json",
];

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScannerConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

/// Everything a scanner process reads at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub scanner: ScannerSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("scanner.default_interval_ms must be greater than zero")]
    ZeroDefaultInterval,
    #[error("scanner.lock_retry_interval_ms must be greater than zero")]
    ZeroLockRetryInterval,
    #[error("scanner.external_url must not be empty")]
    EmptyExternalUrl,
}

impl ScannerConfig {
    /// Load configuration using the process environment and working
    /// directory. Evaluation order:
    /// 1) `$RADAR_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$RADAR_CONFIG_JSON` (inline JSON),
    /// 3) the first default file that exists,
    /// 4) defaults.
    pub fn load_from_env() -> anyhow::Result<(Self, ScannerConfigSource)> {
        Self::load_with(|key| env::var(key).ok(), Path::new("."))
    }

    /// [`ScannerConfig::load_from_env`] with an explicit variable lookup and
    /// directory to search for default files.
    pub fn load_with(
        lookup: impl Fn(&str) -> Option<String>,
        search_root: &Path,
    ) -> anyhow::Result<(Self, ScannerConfigSource)> {
        if let Some(path_str) = lookup(CONFIG_PATH_VAR)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ScannerConfigSource::EnvPath(path)));
        }

        if let Some(raw) = lookup(CONFIG_JSON_VAR)
            && !raw.trim().is_empty()
        {
            let config = Self::parse_json(&raw)
                .and_then(Self::validated)
                .with_context(|| format!("failed to parse {CONFIG_JSON_VAR}"))?;
            return Ok((config, ScannerConfigSource::EnvInline));
        }

        if let Some(path) = find_default_file(search_root) {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ScannerConfigSource::File(path)));
        }

        Ok((Self::default(), ScannerConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read scanner config from {}", path.display())
        })?;

        let parsed = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents),
            Some("toml") => toml::from_str(&contents).map_err(|err| anyhow!("{err}")),
            _ => Self::parse_from_str(&contents),
        };
        parsed
            .and_then(Self::validated)
            .with_context(|| format!("invalid scanner config {}", path.display()))
    }

    /// Parse TOML, falling back to JSON.
    pub fn parse_from_str(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!("toml error: {toml_err}; json error: {json_err}")
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).map_err(|err| anyhow!("invalid scanner config json: {err}"))
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.scanner.default_interval_ms == 0 {
            return Err(ConfigValidationError::ZeroDefaultInterval);
        }
        if self.scanner.lock_retry_interval_ms == 0 {
            return Err(ConfigValidationError::ZeroLockRetryInterval);
        }
        if self.scanner.external_url.trim().is_empty() {
            return Err(ConfigValidationError::EmptyExternalUrl);
        }
        Ok(())
    }

    fn validated(self) -> anyhow::Result<Self> {
        self.validate()?;
        Ok(self)
    }
}

fn find_default_file(root: &Path) -> Option<PathBuf> {
    DEFAULT_FILES
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_without_extension_is_detected() {
        let parsed = ScannerConfig::parse_from_str(
            "[scanner]\ndefault_interval_ms = 30000\n",
        )
        .unwrap();

        assert_eq!(parsed.scanner.default_interval_ms, 30_000);
        assert_eq!(parsed.scanner.lock_retry_interval_ms, 1_000);
    }

    #[test]
    fn json_is_accepted_as_a_fallback() {
        let parsed =
            ScannerConfig::parse_from_str(r#"{"logging": {"filter": "debug"}}"#).unwrap();

        assert_eq!(parsed.logging.filter.as_deref(), Some("debug"));
        assert_eq!(parsed.scanner, ScannerSettings::default());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut config = ScannerConfig::default();
        config.scanner.lock_retry_interval_ms = 0;

        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::ZeroLockRetryInterval)
        );
    }
}
