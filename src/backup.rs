//! Backup and restore of live target files.
//!
//! Two layers live here:
//! - [`Transaction`]: the in-memory journal a switch records into before it
//!   overwrites anything. Rolling it back replays the journal in reverse.
//! - Snapshots: the same pre-switch content persisted under
//!   `~/.devswitch/backups/<id>/` with a `manifest.json`. They back
//!   `devswitch rollback`, manual `devswitch backup`, and recovery of a
//!   switch that was interrupted before it could roll itself back.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DevswitchError;
use crate::fs_utils::{atomic_write, file_mode, read_optional, remove_if_exists, resolve_symlinks};
use crate::paths::Paths;
use crate::targets::Target;

const MANIFEST_FILE: &str = "manifest.json";

/// Pre-switch content of one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub path: PathBuf,
    /// `None` when the path did not exist
    pub content: Option<Vec<u8>>,
    pub mode: Option<u32>,
    pub captured_at: DateTime<Utc>,
}

impl BackupRecord {
    /// Capture the current bytes and mode of `path`
    pub fn capture(path: &Path) -> std::io::Result<Self> {
        let content = read_optional(path)?;
        let mode = content.as_ref().and_then(|_| file_mode(path));
        Ok(Self {
            path: path.to_path_buf(),
            content,
            mode,
            captured_at: Utc::now(),
        })
    }

    /// Put the captured state back on disk
    pub fn write_back(&self) -> std::io::Result<()> {
        match &self.content {
            Some(bytes) => atomic_write(&self.path, bytes, self.mode),
            None => remove_if_exists(&self.path),
        }
    }
}

/// Ordered journal of backups taken during one switch
#[derive(Debug, Default)]
pub struct Transaction {
    records: Vec<BackupRecord>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `path` unless it is already captured in this transaction
    ///
    /// Returns `true` if a new record was taken.
    pub fn backup(&mut self, path: &Path) -> Result<bool> {
        if self.is_backed_up(path) {
            return Ok(false);
        }
        let record = BackupRecord::capture(path)
            .with_context(|| format!("Failed to back up {}", path.display()))?;
        tracing::debug!(path = %path.display(), existed = record.content.is_some(), "backed up");
        self.records.push(record);
        Ok(true)
    }

    pub fn is_backed_up(&self, path: &Path) -> bool {
        self.records.iter().any(|r| r.path == path)
    }

    /// Rewrite `path` from its backup and drop the record
    pub fn restore(&mut self, path: &Path) -> Result<()> {
        let idx = self
            .records
            .iter()
            .position(|r| r.path == path)
            .ok_or_else(|| {
                DevswitchError::CorruptBackup(format!("no backup recorded for {}", path.display()))
            })?;

        self.records[idx]
            .write_back()
            .with_context(|| format!("Failed to restore {}", path.display()))?;
        self.records.remove(idx);
        Ok(())
    }

    /// Restore every record, newest first
    ///
    /// Keeps going after a failure so as many files as possible are restored,
    /// then reports the first error.
    pub fn rollback(&mut self) -> Result<()> {
        let mut first_err = None;
        while let Some(record) = self.records.pop() {
            tracing::info!(path = %record.path.display(), "rolling back");
            if let Err(e) = record.write_back() {
                tracing::warn!(path = %record.path.display(), error = %e, "rollback failed");
                if first_err.is_none() {
                    first_err = Some(
                        anyhow::Error::new(e)
                            .context(format!("Failed to roll back {}", record.path.display())),
                    );
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Finish the transaction, discarding the journal
    pub fn commit(self) -> Vec<BackupRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Switch,
    Manual,
}

/// One target inside a snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub target: Target,
    /// Resolved live path the content was read from
    pub path: PathBuf,
    pub existed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub kind: SnapshotKind,
    /// Profile that was active when the snapshot was taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_profile: Option<String>,
    /// Profile being switched to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_profile: Option<String>,
    pub entries: Vec<SnapshotEntry>,
}

impl SnapshotManifest {
    pub fn targets(&self) -> Vec<Target> {
        self.entries.iter().map(|e| e.target).collect()
    }
}

/// Pick a fresh, chronologically sortable snapshot id
fn new_snapshot_id(paths: &Paths) -> String {
    let base = Utc::now().format("%Y%m%d-%H%M%S-%3f").to_string();
    if !paths.snapshot_dir(&base).exists() {
        return base;
    }
    (1..)
        .map(|n| format!("{}-{:03}", base, n))
        .find(|id| !paths.snapshot_dir(id).exists())
        .unwrap_or(base)
}

/// Persist the current live content of `targets`
pub fn create_snapshot(
    paths: &Paths,
    targets: &[Target],
    kind: SnapshotKind,
    from_profile: Option<&str>,
    to_profile: Option<&str>,
) -> Result<SnapshotManifest> {
    paths.ensure_dirs()?;
    let id = new_snapshot_id(paths);
    let dir = paths.snapshot_dir(&id);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create snapshot directory: {}", dir.display()))?;

    let result = write_snapshot(&dir, id, paths, targets, kind, from_profile, to_profile);
    if result.is_err() {
        let cleanup = fs::remove_dir_all(&dir);
        if let Err(e) = cleanup {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to remove partial snapshot");
        }
    }
    result
}

fn write_snapshot(
    dir: &Path,
    id: String,
    paths: &Paths,
    targets: &[Target],
    kind: SnapshotKind,
    from_profile: Option<&str>,
    to_profile: Option<&str>,
) -> Result<SnapshotManifest> {
    let mut entries = Vec::with_capacity(targets.len());
    for target in targets {
        let live = resolve_symlinks(&target.live_path(paths));
        let content = read_optional(&live).map_err(|e| DevswitchError::TargetUnwritable {
            path: live.clone(),
            source: e,
        })?;
        let mode = content.as_ref().and_then(|_| file_mode(&live));

        if let Some(bytes) = &content {
            let data = dir.join(target.file_name());
            atomic_write(&data, bytes, mode)
                .with_context(|| format!("Failed to write backup file: {}", data.display()))?;
        }

        entries.push(SnapshotEntry {
            target: *target,
            path: live,
            existed: content.is_some(),
            mode,
        });
    }

    let manifest = SnapshotManifest {
        id,
        created_at: Utc::now(),
        kind,
        from_profile: from_profile.map(str::to_string),
        to_profile: to_profile.map(str::to_string),
        entries,
    };

    // Manifest last: a snapshot without one is incomplete and never restored
    let content =
        serde_json::to_string_pretty(&manifest).context("Failed to serialize snapshot manifest")?;
    atomic_write(&dir.join(MANIFEST_FILE), content.as_bytes(), None)
        .with_context(|| format!("Failed to write snapshot manifest in {}", dir.display()))?;

    tracing::info!(id = %manifest.id, targets = manifest.entries.len(), "snapshot created");
    Ok(manifest)
}

/// Snapshot ids, oldest first
pub fn list_snapshot_ids(paths: &Paths) -> Result<Vec<String>> {
    if !paths.backups_dir.exists() {
        return Ok(Vec::new());
    }

    let mut ids: Vec<String> = fs::read_dir(&paths.backups_dir)
        .with_context(|| format!("Failed to read backups directory: {:?}", paths.backups_dir))?
        .filter_map(|e| e.ok())
        // A snapshot without a manifest was never finished
        .filter(|e| e.path().join(MANIFEST_FILE).is_file())
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .collect();
    ids.sort();
    Ok(ids)
}

pub fn latest_snapshot_id(paths: &Paths) -> Result<Option<String>> {
    Ok(list_snapshot_ids(paths)?.pop())
}

/// Load and verify a snapshot
///
/// Fails with `CorruptBackup` if the snapshot, its manifest, or any data
/// file it references is missing.
pub fn load_snapshot(paths: &Paths, id: &str) -> Result<SnapshotManifest> {
    let dir = paths.snapshot_dir(id);
    if !dir.is_dir() {
        return Err(DevswitchError::CorruptBackup(format!("snapshot '{}' not found", id)).into());
    }

    let manifest_path = dir.join(MANIFEST_FILE);
    let content = fs::read_to_string(&manifest_path).map_err(|_| {
        DevswitchError::CorruptBackup(format!("snapshot '{}' has no manifest", id))
    })?;
    let manifest: SnapshotManifest = serde_json::from_str(&content).map_err(|e| {
        DevswitchError::CorruptBackup(format!("snapshot '{}' manifest unreadable: {}", id, e))
    })?;

    for entry in manifest.entries.iter().filter(|e| e.existed) {
        if !dir.join(entry.target.file_name()).is_file() {
            return Err(DevswitchError::CorruptBackup(format!(
                "snapshot '{}' is missing {}",
                id,
                entry.target.file_name()
            ))
            .into());
        }
    }

    Ok(manifest)
}

/// Load the captured state of every entry as backup records
fn snapshot_records(paths: &Paths, manifest: &SnapshotManifest) -> Result<Vec<BackupRecord>> {
    let dir = paths.snapshot_dir(&manifest.id);
    manifest
        .entries
        .iter()
        .map(|entry| -> Result<BackupRecord> {
            let content = if entry.existed {
                let data = dir.join(entry.target.file_name());
                Some(fs::read(&data).map_err(|e| {
                    DevswitchError::CorruptBackup(format!("{}: {}", data.display(), e))
                })?)
            } else {
                None
            };
            Ok(BackupRecord {
                path: entry.path.clone(),
                content,
                mode: entry.mode,
                captured_at: manifest.created_at,
            })
        })
        .collect()
}

/// Write a snapshot back to the live files, all or nothing
///
/// Returns the targets that were restored.
pub fn restore_snapshot(paths: &Paths, id: &str) -> Result<Vec<Target>> {
    let manifest = load_snapshot(paths, id)?;
    let records = snapshot_records(paths, &manifest)?;

    let mut tx = Transaction::new();
    for record in &records {
        let applied = tx.backup(&record.path).and_then(|_| {
            record.write_back().map_err(|e| {
                DevswitchError::TargetUnwritable {
                    path: record.path.clone(),
                    source: e,
                }
                .into()
            })
        });

        if let Err(e) = applied {
            tracing::warn!(id, error = %e, "snapshot restore failed, rolling back");
            if let Err(rb) = tx.rollback() {
                return Err(e.context(format!("rollback also failed: {:#}", rb)));
            }
            return Err(e);
        }
    }
    tx.commit();

    tracing::info!(id, targets = records.len(), "snapshot restored");
    Ok(manifest.targets())
}

/// Delete the oldest snapshots, keeping `keep`
///
/// Returns how many were removed.
pub fn prune_snapshots(paths: &Paths, keep: usize) -> Result<usize> {
    let ids = list_snapshot_ids(paths)?;
    if ids.len() <= keep {
        return Ok(0);
    }

    let to_remove = ids.len() - keep;
    for id in ids.iter().take(to_remove) {
        let dir = paths.snapshot_dir(id);
        fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to remove snapshot: {}", dir.display()))?;
        tracing::debug!(id = %id, "pruned snapshot");
    }
    Ok(to_remove)
}

/// Delete one snapshot by id
pub fn remove_snapshot(paths: &Paths, id: &str) -> Result<()> {
    let dir = paths.snapshot_dir(id);
    if !dir.is_dir() {
        bail!("Snapshot '{}' not found", id);
    }
    fs::remove_dir_all(&dir)
        .with_context(|| format!("Failed to remove snapshot: {}", dir.display()))
}
