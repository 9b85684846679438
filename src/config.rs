//! User configuration stored in ~/.devswitch/config.json
//!
//! The file is optional. Missing fields fall back to their defaults, so a
//! config containing only `{"max_backups": 3}` is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::targets::Target;

/// Number of snapshots kept when the config does not say otherwise
pub const DEFAULT_MAX_BACKUPS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many snapshots to keep in ~/.devswitch/backups
    pub max_backups: usize,

    /// Targets devswitch never touches, even if a profile contains them
    pub disabled_targets: Vec<Target>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_backups: DEFAULT_MAX_BACKUPS,
            disabled_targets: Vec::new(),
        }
    }
}

impl Config {
    /// Read config from file, returning default if file doesn't exist
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        tracing::debug!(?path, max_backups = config.max_backups, "loaded config");
        Ok(config)
    }

    /// Whether a target may be written by a switch
    pub fn is_enabled(&self, target: Target) -> bool {
        !self.disabled_targets.contains(&target)
    }

    /// Snapshot retention, never below one so rollback always has something
    pub fn retention(&self) -> usize {
        self.max_backups.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_missing_file() {
        let temp = TempDir::new().unwrap();
        let config = Config::read(&temp.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.retention(), DEFAULT_MAX_BACKUPS);
    }

    #[test]
    fn test_config_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"disabled_targets": ["aws-credentials"]}"#).unwrap();

        let config = Config::read(&path).unwrap();
        assert_eq!(config.max_backups, DEFAULT_MAX_BACKUPS);
        assert!(!config.is_enabled(Target::AwsCredentials));
        assert!(config.is_enabled(Target::Gitconfig));
    }

    #[test]
    fn test_config_invalid_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Config::read(&path).is_err());
    }

    #[test]
    fn test_retention_floor() {
        let config = Config {
            max_backups: 0,
            ..Config::default()
        };
        assert_eq!(config.retention(), 1);
    }
}
