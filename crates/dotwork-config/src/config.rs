//! Configuration types and loading.
//!
//! The main entry point is [`WorkConfig`], representing the contents of
//! `.work/config.yaml`. Every field has a default, so a missing file yields
//! a fully usable configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// The configuration file contained invalid YAML.
    #[error("failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// The `.work/` directory was not found.
    #[error("no .work directory found")]
    WorkDirNotFound,

    /// A configuration value was invalid.
    #[error("invalid configuration value for key '{key}': {reason}")]
    InvalidValue {
        /// The configuration key that had an invalid value.
        key: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// The config file name inside `.work/`.
const CONFIG_FILE_NAME: &str = "config.yaml";

fn default_id_hash_len() -> usize {
    12
}

fn default_max_list_limit() -> u32 {
    50_000
}

fn default_stale_days() -> i64 {
    30
}

fn default_scope_cache_ttl_secs() -> u64 {
    60
}

fn default_id_retries() -> u32 {
    5
}

/// Tracker configuration, loaded from `.work/config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkConfig {
    /// Base36 hash length in generated entity ids.
    #[serde(default = "default_id_hash_len")]
    pub id_hash_len: usize,

    /// Retries against the live store before id generation gives up.
    #[serde(default = "default_id_retries")]
    pub id_retries: u32,

    /// Ceiling applied to every listing limit (the safe limit).
    #[serde(default = "default_max_list_limit")]
    pub max_list_limit: u32,

    /// Default threshold for stale-issue listings, in days.
    #[serde(default = "default_stale_days")]
    pub stale_days: i64,

    /// Scope cache entry time-to-live, in seconds.
    #[serde(default = "default_scope_cache_ttl_secs")]
    pub scope_cache_ttl_secs: u64,
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            id_hash_len: default_id_hash_len(),
            id_retries: default_id_retries(),
            max_list_limit: default_max_list_limit(),
            stale_days: default_stale_days(),
            scope_cache_ttl_secs: default_scope_cache_ttl_secs(),
        }
    }
}

impl WorkConfig {
    /// Loads the configuration from `.work/config.yaml` under `work_dir`.
    ///
    /// A missing file yields the defaults; a present but malformed file is
    /// an error.
    pub fn load(work_dir: &Path) -> Result<Self> {
        let path = work_dir.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration to `.work/config.yaml` under `work_dir`.
    pub fn save(&self, work_dir: &Path) -> Result<()> {
        let path = work_dir.join(CONFIG_FILE_NAME);
        let contents = serde_yaml::to_string(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.id_hash_len < 3 || self.id_hash_len > 16 {
            return Err(ConfigError::InvalidValue {
                key: "id_hash_len".into(),
                reason: "must be between 3 and 16".into(),
            });
        }
        if self.max_list_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_list_limit".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkConfig::load(dir.path()).unwrap();
        assert_eq!(config, WorkConfig::default());
        assert_eq!(config.max_list_limit, 50_000);
        assert_eq!(config.scope_cache_ttl_secs, 60);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkConfig {
            stale_days: 14,
            ..Default::default()
        };
        config.save(dir.path()).unwrap();

        let back = WorkConfig::load(dir.path()).unwrap();
        assert_eq!(back.stale_days, 14);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "stale_days: 7\n").unwrap();

        let config = WorkConfig::load(dir.path()).unwrap();
        assert_eq!(config.stale_days, 7);
        assert_eq!(config.id_hash_len, 12);
    }

    #[test]
    fn invalid_hash_len_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "id_hash_len: 1\n").unwrap();

        let err = WorkConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn malformed_yaml_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "stale_days: [oops\n").unwrap();
        assert!(WorkConfig::load(dir.path()).is_err());
    }
}
