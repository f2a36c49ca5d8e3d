//! Config loading and persistence.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub replayer: ReplayerTuning,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn store(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub format: LogFormat,
    pub verbosity: u8,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            format: LogFormat::Compact,
            verbosity: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

/// Replayer behavior knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayerTuning {
    /// Object advances between persisted copy-progress writes; 0 disables
    /// mid-stream persistence and a restart redoes the whole delta.
    pub progress_flush_objects: u64,
}

impl Default for ReplayerTuning {
    fn default() -> Self {
        Self {
            progress_flush_objects: 64,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write config at {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");

        let config = Config::default();
        config.store(&path).expect("store");
        let loaded = Config::load(&path).expect("load");

        assert_eq!(
            loaded.replayer.progress_flush_objects,
            config.replayer.progress_flush_objects
        );
        assert_eq!(loaded.logging.format, config.logging.format);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.replayer.progress_flush_objects, 64);
        assert!(config.logging.stdout);
    }

    #[test]
    fn malformed_config_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").expect("write");

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }
}
