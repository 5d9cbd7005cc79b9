// Configuration Management Module
// Handles drain.toml loading, defaults, and validation

use crate::signals::parse_signal;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::c_int;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DrainConfig {
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Signals that start a shutdown round
    #[serde(default = "default_signals")]
    pub signals: Vec<String>,

    /// Upper bound for waiting on outstanding work before forcing completion
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_ms: u64,

    /// Upper bound for a single cleanup function
    #[serde(default = "default_cleanup_timeout")]
    pub cleanup_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter directive, overridden by RUST_LOG
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_signals() -> Vec<String> { vec!["SIGINT".to_string(), "SIGTERM".to_string()] }
fn default_wait_timeout() -> u64 { 5000 }
fn default_cleanup_timeout() -> u64 { 1000 }
fn default_filter() -> String { "graceful_drain=info".to_string() }

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            signals: default_signals(),
            wait_timeout_ms: default_wait_timeout(),
            cleanup_timeout_ms: default_cleanup_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The path did not exist; built-in defaults were used
    Defaults(PathBuf),
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigSource::Defaults(path) => {
                warn!("Configuration file {} not found, using defaults", path.display())
            }
        }
    }
}

impl ShutdownConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }

    /// Resolve the configured signal names to signal numbers
    pub fn signal_numbers(&self) -> Result<Vec<c_int>> {
        self.signals
            .iter()
            .map(|name| parse_signal(name).with_context(|| format!("Invalid shutdown signal '{}'", name)))
            .collect()
    }
}

impl DrainConfig {
    /// Load configuration from file or use defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (config, source) = Self::load_with_source(path)?;
        source.log();
        Ok(config)
    }

    /// Load without logging, reporting where the values came from.
    /// For callers that install the tracing subscriber from the loaded config.
    pub fn load_with_source<P: AsRef<Path>>(path: P) -> Result<(Self, ConfigSource)> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok((Self::default(), ConfigSource::Defaults(path.to_path_buf())));
        }

        let contents = std::fs::read_to_string(path)
            .context("Failed to read configuration file")?;

        let config: DrainConfig = toml::from_str(&contents)
            .context("Failed to parse configuration file")?;

        config.validate()?;
        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.shutdown.wait_timeout_ms == 0 {
            anyhow::bail!("Wait timeout must be greater than 0");
        }

        if self.shutdown.cleanup_timeout_ms == 0 {
            anyhow::bail!("Cleanup timeout must be greater than 0");
        }

        if self.shutdown.signals.is_empty() {
            anyhow::bail!("At least one shutdown signal is required");
        }

        self.shutdown.signal_numbers()?;

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DrainConfig::default();
        assert_eq!(config.shutdown.wait_timeout(), Duration::from_secs(5));
        assert_eq!(config.shutdown.cleanup_timeout(), Duration::from_secs(1));
        assert_eq!(config.shutdown.signal_numbers().unwrap().len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_timeout() {
        let mut config = DrainConfig::default();
        config.shutdown.wait_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_forbidden_signal_rejected() {
        let mut config = DrainConfig::default();
        config.shutdown.signals = vec!["SIGKILL".to_string()];
        assert!(config.validate().is_err());

        config.shutdown.signals.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[shutdown]\nwait_timeout_ms = 250\nsignals = [\"hup\"]").unwrap();

        let config = DrainConfig::load(file.path()).unwrap();
        assert_eq!(config.shutdown.wait_timeout_ms, 250);
        assert_eq!(config.shutdown.cleanup_timeout_ms, 1000);
        assert_eq!(config.shutdown.signal_numbers().unwrap(), vec![signal_hook::consts::SIGHUP]);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DrainConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.shutdown.wait_timeout_ms, 5000);
    }

    #[test]
    fn test_load_reports_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let (_, source) = DrainConfig::load_with_source(&missing).unwrap();
        assert_eq!(source, ConfigSource::Defaults(missing));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\njson = true").unwrap();
        let (config, source) = DrainConfig::load_with_source(file.path()).unwrap();
        assert!(config.logging.json);
        assert_eq!(source, ConfigSource::File(file.path().to_path_buf()));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "shutdown = 12").unwrap();
        assert!(DrainConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let rendered = DrainConfig::default().to_toml().unwrap();
        let parsed: DrainConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.shutdown.signals, default_signals());
    }
}
