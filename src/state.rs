use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::DevswitchError;

/// Active profile marker stored in ~/.devswitch/state.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct State {
    /// The profile currently applied to the live files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_profile: Option<String>,

    /// When the state was last updated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Snapshot taken by the most recent switch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_snapshot: Option<String>,

    /// Snapshot of a switch that started but never finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_switch: Option<String>,
}

impl State {
    /// Read state without locking, returning default if file doesn't exist
    ///
    /// For display only; anything that mutates live files goes through
    /// [`LockedState`].
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {:?}", path))?;

        parse_state(&content, path)
    }
}

fn parse_state(content: &str, path: &Path) -> Result<State> {
    if content.trim().is_empty() {
        return Ok(State::default());
    }

    serde_json::from_str(content).with_context(|| format!("Failed to parse state file: {:?}", path))
}

/// Exclusive handle on the state file
///
/// Holding one of these is what "a switch is in progress" means. The lock is
/// released when the value is dropped, whichever way the caller exits.
#[derive(Debug)]
pub struct LockedState {
    file: File,
    state: State,
    path: PathBuf,
}

impl LockedState {
    /// Open and lock the state file, failing fast with `LockContention` if
    /// another process holds it
    pub fn lock(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory: {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open state file: {:?}", path))?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(DevswitchError::LockContention(path.to_path_buf()).into());
            }
            return Err(e).with_context(|| format!("Failed to lock state file: {:?}", path));
        }
        tracing::debug!(?path, "acquired state lock");

        let state = Self::read_from_file(&file, path)?;

        Ok(Self {
            file,
            state,
            path: path.to_path_buf(),
        })
    }

    fn read_from_file(mut file: &File, path: &Path) -> Result<State> {
        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("Failed to read state file: {:?}", path))?;
        parse_state(&content, path)
    }

    /// Get the current state
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Update and save the state
    pub fn update<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut State),
    {
        f(&mut self.state);
        self.state.updated_at = Some(Utc::now());
        self.save()
    }

    fn save(&mut self) -> Result<()> {
        let content =
            serde_json::to_string_pretty(&self.state).context("Failed to serialize state")?;

        // Rewrite in place; renaming over the file would drop the lock
        self.file
            .set_len(0)
            .with_context(|| format!("Failed to truncate state file: {:?}", self.path))?;
        self.file
            .seek(SeekFrom::Start(0))
            .with_context(|| format!("Failed to seek state file: {:?}", self.path))?;
        self.file
            .write_all(content.as_bytes())
            .with_context(|| format!("Failed to write state file: {:?}", self.path))?;
        self.file
            .sync_all()
            .with_context(|| format!("Failed to sync state file: {:?}", self.path))?;

        Ok(())
    }
}

impl Drop for LockedState {
    fn drop(&mut self) {
        // Release the lock (ignore errors during drop)
        let _ = FileExt::unlock(&self.file);
        tracing::debug!(path = ?self.path, "released state lock");
    }
}

/// Whether another process currently holds the state lock
pub fn is_locked(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let file = File::open(path).with_context(|| format!("Failed to open state file: {:?}", path))?;
    match FileExt::try_lock_shared(&file) {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            Ok(false)
        }
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(true),
        Err(e) => Err(e).with_context(|| format!("Failed to probe state lock: {:?}", path)),
    }
}
