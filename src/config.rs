//! Store configuration
//!
//! Loaded from YAML or built in code; every field has a default.

use crate::session::SessionIsolationLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a lock request may wait before it is treated as a deadlock
    pub lock_timeout_ms: u64,
    /// Isolation used by sessions that do not ask for one
    pub default_isolation: SessionIsolationLevel,
    /// Maximum depth of nested session scopes
    pub max_nesting_depth: usize,
    /// Update distinct indexes in parallel on commit
    pub parallel_index_updates: bool,
    pub statistics_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
            default_isolation: SessionIsolationLevel::Serializable,
            max_nesting_depth: 32,
            parallel_index_updates: true,
            statistics_enabled: true,
        }
    }
}

impl StoreConfig {
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        let config: StoreConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid("lock_timeout_ms must be positive".into()));
        }
        if self.max_nesting_depth == 0 {
            return Err(ConfigError::Invalid("max_nesting_depth must be positive".into()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = StoreConfig::from_yaml_str("lock_timeout_ms: 250\ndefault_isolation: ReadCommitted\n").unwrap();
        assert_eq!(config.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.default_isolation, SessionIsolationLevel::ReadCommitted);
        assert_eq!(config.max_nesting_depth, 32);
        assert!(config.parallel_index_updates);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = StoreConfig::from_yaml_str("lock_timeout_ms: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = StoreConfig::from_yaml_str("lock_timeout_ms: [").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_nesting_depth: 4\nstatistics_enabled: false").unwrap();
        let config = StoreConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_nesting_depth, 4);
        assert!(!config.statistics_enabled);

        let missing = StoreConfig::from_file(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
