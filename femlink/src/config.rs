//! Session configuration loading
//!
//! TOML-based configuration with defaults suitable for a local solver
//! exchange. Transport selection happens once per session from these values.
//!
//! # TOML Example
//!
//! ```toml
//! session_name = "topo-opt-01"
//! namespace = "femlink_"
//! segment_size = 1048576
//! wait_timeout_ms = 5000
//! transport = "auto"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Which transport the session should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportPreference {
    /// Probe shared memory, fall back to files
    #[default]
    Auto,
    /// Require the shared-memory fast path
    Shm,
    /// Always use the file transport
    File,
}

/// Configuration for one exchange session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Session identifier, used in log output
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// Prefix for OS object names (segments, semaphores, sidecar records)
    ///
    /// Both processes derive object names from `namespace + segment name`,
    /// so it must match on both sides.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Default payload capacity for slot-style segments, in bytes
    #[serde(default = "default_segment_size")]
    pub segment_size: usize,

    /// Hand-off wait budget in milliseconds
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Directory for file-transport data and metadata files
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,

    /// Transport preference
    #[serde(default)]
    pub transport: TransportPreference,
}

fn default_session_name() -> String {
    "femlink".to_string()
}

fn default_namespace() -> String {
    "femlink_".to_string()
}

fn default_segment_size() -> usize {
    1024 * 1024
}

fn default_wait_timeout_ms() -> u64 {
    crate::gate::DEFAULT_WAIT_TIMEOUT.as_millis() as u64
}

fn default_spool_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            session_name: default_session_name(),
            namespace: default_namespace(),
            segment_size: default_segment_size(),
            wait_timeout_ms: default_wait_timeout_ms(),
            spool_dir: default_spool_dir(),
            transport: TransportPreference::default(),
        }
    }
}

impl ExchangeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound);
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `namespace` is empty or contains a path separator
    /// - `segment_size` is zero
    /// - `wait_timeout_ms` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::ValidationError(
                "namespace must not be empty".to_string(),
            ));
        }
        if self.namespace.contains('/') {
            return Err(ConfigError::ValidationError(
                "namespace must not contain '/'".to_string(),
            ));
        }
        if self.segment_size == 0 {
            return Err(ConfigError::ValidationError(
                "segment_size must be positive".to_string(),
            ));
        }
        if self.wait_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "wait_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Hand-off wait budget as a `Duration`
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = ExchangeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.namespace, "femlink_");
        assert_eq!(config.wait_timeout(), Duration::from_secs(5));
        assert_eq!(config.transport, TransportPreference::Auto);
    }

    #[test]
    fn load_from_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("exchange.toml");
        std::fs::write(
            &path,
            r#"
session_name = "matrix-run"
namespace = "mx_"
segment_size = 65536
wait_timeout_ms = 1500
transport = "file"
"#,
        )
        .unwrap();

        let config = ExchangeConfig::load(&path).unwrap();
        assert_eq!(config.session_name, "matrix-run");
        assert_eq!(config.namespace, "mx_");
        assert_eq!(config.segment_size, 65536);
        assert_eq!(config.transport, TransportPreference::File);
    }

    #[test]
    fn missing_file_is_reported() {
        let result = ExchangeConfig::load(Path::new("/nonexistent/exchange.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn bad_namespace_rejected() {
        let config = ExchangeConfig {
            namespace: "a/b".to_string(),
            ..ExchangeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
