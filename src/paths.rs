use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::PathBuf;

/// Environment variable that re-roots every devswitch path (state and live targets)
pub const HOME_ENV: &str = "DEVSWITCH_HOME";

/// All computed paths used by devswitch
#[derive(Debug, Clone)]
pub struct Paths {
    /// Home directory the live targets are resolved against
    pub home_dir: PathBuf,
    /// Per-user config root (~/.config, ~/Library/Application Support, %APPDATA%)
    pub config_dir: PathBuf,
    /// ~/.devswitch
    pub base_dir: PathBuf,
    /// ~/.devswitch/profiles
    pub profiles_dir: PathBuf,
    /// ~/.devswitch/backups
    pub backups_dir: PathBuf,
    /// ~/.devswitch/state.json (active profile marker, also the lock file)
    pub state_file: PathBuf,
    /// ~/.devswitch/config.json
    pub config_file: PathBuf,
}

impl Paths {
    pub fn new() -> Result<Self> {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_home(PathBuf::from(home)));
        }

        let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
        Ok(Self::from_dirs(
            base_dirs.home_dir().to_path_buf(),
            base_dirs.config_dir().to_path_buf(),
        ))
    }

    /// Build paths rooted at an arbitrary home directory
    pub fn with_home(home: PathBuf) -> Self {
        let config_dir = if cfg!(target_os = "macos") {
            home.join("Library").join("Application Support")
        } else if cfg!(windows) {
            home.join("AppData").join("Roaming")
        } else {
            home.join(".config")
        };
        Self::from_dirs(home, config_dir)
    }

    fn from_dirs(home_dir: PathBuf, config_dir: PathBuf) -> Self {
        let base_dir = home_dir.join(".devswitch");
        Self {
            profiles_dir: base_dir.join("profiles"),
            backups_dir: base_dir.join("backups"),
            state_file: base_dir.join("state.json"),
            config_file: base_dir.join("config.json"),
            base_dir,
            home_dir,
            config_dir,
        }
    }

    /// Get the path to a specific profile directory
    pub fn profile_dir(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(name)
    }

    /// Get the path to a snapshot directory
    pub fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.backups_dir.join(id)
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.profiles_dir).with_context(|| {
            format!(
                "Failed to create profiles directory: {:?}",
                self.profiles_dir
            )
        })?;
        std::fs::create_dir_all(&self.backups_dir).with_context(|| {
            format!("Failed to create backups directory: {:?}", self.backups_dir)
        })?;
        Ok(())
    }
}
