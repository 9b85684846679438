//! Profile store.
//!
//! A profile is a directory under `~/.devswitch/profiles/<name>/` holding one
//! file per target it governs (named by [`Target::file_name`]) and an
//! optional `profile.json` with metadata. The files alone define what a
//! switch writes, so a profile can be edited with any text editor.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DevswitchError;
use crate::fs_utils::{atomic_write, file_mode, read_optional, resolve_symlinks};
use crate::paths::Paths;
use crate::state::LockedState;
use crate::targets::Target;
use crate::templates::Template;

const METADATA_FILE: &str = "profile.json";

/// Metadata for a profile, stored in profile.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub version: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Template the profile was created from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl ProfileMetadata {
    pub fn new(name: String, description: Option<String>, template: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            name,
            created_at: now,
            updated_at: now,
            description,
            template,
        }
    }

    /// Read metadata from a profile directory
    ///
    /// Hand-made profiles without profile.json get metadata synthesized from
    /// the directory itself.
    pub fn read(profile_dir: &Path) -> Result<Self> {
        let metadata_path = profile_dir.join(METADATA_FILE);

        if !metadata_path.exists() {
            let name = profile_dir
                .file_name()
                .and_then(|n| n.to_str())
                .context("Invalid profile directory name")?
                .to_string();
            let modified: DateTime<Utc> = fs::metadata(profile_dir)
                .and_then(|m| m.modified())
                .map(Into::into)
                .unwrap_or_else(|_| Utc::now());
            return Ok(Self {
                version: env!("CARGO_PKG_VERSION").to_string(),
                name,
                created_at: modified,
                updated_at: modified,
                description: None,
                template: None,
            });
        }

        let content = fs::read_to_string(&metadata_path)
            .with_context(|| format!("Failed to read {}", metadata_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", metadata_path.display()))
    }

    /// Write metadata to a profile directory
    pub fn write(&self, profile_dir: &Path) -> Result<()> {
        let metadata_path = profile_dir.join(METADATA_FILE);
        let content = serde_json::to_string_pretty(self).context("Failed to serialize metadata")?;
        fs::write(&metadata_path, content)
            .with_context(|| format!("Failed to write {}", metadata_path.display()))?;
        Ok(())
    }
}

/// One governed target and the file holding its declared content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub target: Target,
    pub source: PathBuf,
}

impl ProfileEntry {
    pub fn read(&self) -> Result<Vec<u8>> {
        fs::read(&self.source).with_context(|| format!("Failed to read {}", self.source.display()))
    }
}

/// A loaded profile
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub metadata: ProfileMetadata,
    /// Governed targets in canonical order
    pub entries: Vec<ProfileEntry>,
}

impl Profile {
    pub fn targets(&self) -> Vec<Target> {
        self.entries.iter().map(|e| e.target).collect()
    }

    pub fn entry(&self, target: Target) -> Option<&ProfileEntry> {
        self.entries.iter().find(|e| e.target == target)
    }
}

/// List available profiles
pub fn list_profiles(paths: &Paths) -> Result<Vec<String>> {
    let mut profiles = Vec::new();
    if paths.profiles_dir.exists() {
        for entry in fs::read_dir(&paths.profiles_dir)
            .with_context(|| format!("Failed to read {}", paths.profiles_dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if validate_profile_name(name).is_ok() {
                    profiles.push(name.to_string());
                }
            }
        }
    }
    profiles.sort();
    Ok(profiles)
}

/// Check if a profile exists
pub fn profile_exists(paths: &Paths, name: &str) -> bool {
    validate_profile_name(name).is_ok() && paths.profile_dir(name).is_dir()
}

/// Validate profile name
///
/// Only allows alphanumeric characters, underscores, and hyphens.
pub fn validate_profile_name(name: &str) -> Result<(), DevswitchError> {
    let valid = !name.is_empty()
        && name.chars().count() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(DevswitchError::InvalidProfileName(name.to_string()))
    }
}

/// Load a profile and the targets it governs
pub fn load_profile(paths: &Paths, name: &str) -> Result<Profile> {
    if !profile_exists(paths, name) {
        return Err(DevswitchError::UnknownProfile(name.to_string()).into());
    }

    let dir = paths.profile_dir(name);
    let metadata = ProfileMetadata::read(&dir)?;
    let entries = Target::all()
        .into_iter()
        .map(|target| ProfileEntry {
            target,
            source: target.profile_path(paths, name),
        })
        .filter(|e| e.source.is_file())
        .collect();

    Ok(Profile {
        name: name.to_string(),
        metadata,
        entries,
    })
}

fn prepare_new_profile(paths: &Paths, name: &str) -> Result<PathBuf> {
    validate_profile_name(name)?;
    paths.ensure_dirs()?;

    let profile_dir = paths.profile_dir(name);
    if profile_dir.exists() {
        return Err(DevswitchError::ProfileExists(name.to_string()).into());
    }
    fs::create_dir_all(&profile_dir)
        .with_context(|| format!("Failed to create profile directory: {}", profile_dir.display()))?;
    Ok(profile_dir)
}

/// Run `fill` on a freshly created profile dir, removing the dir if it fails
fn populate_new_profile<F>(profile_dir: &Path, fill: F) -> Result<Vec<Target>>
where
    F: FnOnce() -> Result<Vec<Target>>,
{
    let result = fill();
    if result.is_err() {
        let _ = fs::remove_dir_all(profile_dir);
    }
    result
}

/// Create a new profile by copying the current live files
///
/// `only` restricts which targets are captured. Targets missing on disk are
/// skipped. Returns the captured targets.
pub fn create_from_current(
    paths: &Paths,
    name: &str,
    only: Option<&[Target]>,
    description: Option<String>,
) -> Result<Vec<Target>> {
    let profile_dir = prepare_new_profile(paths, name)?;

    populate_new_profile(&profile_dir, || {
        let mut captured = Vec::new();
        for target in Target::all() {
            if only.is_some_and(|o| !o.contains(&target)) {
                continue;
            }

            let live = resolve_symlinks(&target.live_path(paths));
            let Some(content) = read_optional(&live)
                .with_context(|| format!("Failed to read {}", live.display()))?
            else {
                continue;
            };

            if target.is_json() && serde_json::from_slice::<serde_json::Value>(&content).is_err() {
                // VS Code accepts comments and trailing commas; keep the bytes as-is
                tracing::warn!(file = target.key(), "captured file is not strict JSON");
            }

            let dest = target.profile_path(paths, name);
            atomic_write(&dest, &content, file_mode(&live))
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            captured.push(target);
        }

        ProfileMetadata::new(name.to_string(), description, None).write(&profile_dir)?;
        tracing::info!(profile = name, targets = captured.len(), "profile created from current files");
        Ok(captured)
    })
}

/// Create a new profile from a built-in template
pub fn create_from_template(
    paths: &Paths,
    name: &str,
    template: Template,
    description: Option<String>,
) -> Result<Vec<Target>> {
    let profile_dir = prepare_new_profile(paths, name)?;

    populate_new_profile(&profile_dir, || {
        let mut written = Vec::new();
        for (target, content) in template.files() {
            let dest = target.profile_path(paths, name);
            fs::write(&dest, content)
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            written.push(target);
        }

        ProfileMetadata::new(
            name.to_string(),
            description,
            Some(template.name().to_string()),
        )
        .write(&profile_dir)?;
        tracing::info!(profile = name, template = template.name(), "profile created from template");
        Ok(written)
    })
}

/// Remove a profile
///
/// The active profile is only removed with `force`, and then the marker is
/// cleared.
pub fn remove_profile(paths: &Paths, name: &str, force: bool) -> Result<()> {
    if !profile_exists(paths, name) {
        return Err(DevswitchError::UnknownProfile(name.to_string()).into());
    }

    let mut locked = LockedState::lock(&paths.state_file)?;
    let is_active = locked.state().active_profile.as_deref() == Some(name);
    if is_active && !force {
        bail!(
            "Profile '{}' is currently active.\nHint: Switch to another profile first, or pass --force.",
            name
        );
    }

    let profile_dir = paths.profile_dir(name);
    fs::remove_dir_all(&profile_dir).with_context(|| {
        format!(
            "Failed to remove profile directory: {}",
            profile_dir.display()
        )
    })?;

    if is_active {
        locked.update(|s| s.active_profile = None)?;
    }
    tracing::info!(profile = name, "profile removed");
    Ok(())
}

/// Rename a profile, following it with the active marker
pub fn rename_profile(paths: &Paths, old_name: &str, new_name: &str) -> Result<()> {
    validate_profile_name(new_name)?;
    if !profile_exists(paths, old_name) {
        return Err(DevswitchError::UnknownProfile(old_name.to_string()).into());
    }

    let new_dir = paths.profile_dir(new_name);
    if new_dir.exists() {
        return Err(DevswitchError::ProfileExists(new_name.to_string()).into());
    }

    let mut locked = LockedState::lock(&paths.state_file)?;
    let old_dir = paths.profile_dir(old_name);
    fs::rename(&old_dir, &new_dir).with_context(|| {
        format!(
            "Failed to rename '{}' to '{}'",
            old_dir.display(),
            new_dir.display()
        )
    })?;

    let mut metadata = ProfileMetadata::read(&new_dir)?;
    metadata.name = new_name.to_string();
    metadata.updated_at = Utc::now();
    metadata.write(&new_dir)?;

    if locked.state().active_profile.as_deref() == Some(old_name) {
        locked.update(|s| s.active_profile = Some(new_name.to_string()))?;
    }
    Ok(())
}

/// Validate that a file contains valid JSON
pub fn validate_json_file(path: &Path) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    serde_json::from_str::<serde_json::Value>(&content)
        .with_context(|| format!("Invalid JSON in file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;
    use crate::test_utils::{setup_test_paths, write_live, write_profile};
    use tempfile::TempDir;

    #[test]
    fn test_profile_name_validation() {
        assert!(validate_profile_name("work").is_ok());
        assert!(validate_profile_name("my-profile").is_ok());
        assert!(validate_profile_name("test_123").is_ok());

        assert!(validate_profile_name("").is_err());
        assert!(validate_profile_name("invalid name").is_err());
        assert!(validate_profile_name("../escape").is_err());
        assert!(validate_profile_name("emoji😊").is_err());
        assert!(validate_profile_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_create_from_current() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_live(&paths, Target::Gitconfig, "[user]\n\tname = Me\n");
        write_live(&paths, Target::Vscode, "{ \"editor.tabSize\": 4 }");

        let captured = create_from_current(&paths, "work", None, None).unwrap();
        assert_eq!(captured, vec![Target::Gitconfig, Target::Vscode]);

        let profile = load_profile(&paths, "work").unwrap();
        assert_eq!(profile.targets(), captured);
        assert_eq!(
            fs::read_to_string(&profile.entry(Target::Gitconfig).unwrap().source).unwrap(),
            "[user]\n\tname = Me\n"
        );
        assert_eq!(profile.metadata.name, "work");
    }

    #[test]
    fn test_create_from_current_only() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_live(&paths, Target::Gitconfig, "git");
        write_live(&paths, Target::Zshrc, "zsh");

        let captured =
            create_from_current(&paths, "school", Some(&[Target::Zshrc]), None).unwrap();
        assert_eq!(captured, vec![Target::Zshrc]);
        assert!(!Target::Gitconfig.profile_path(&paths, "school").exists());
    }

    #[test]
    fn test_create_duplicate_and_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        create_from_template(&paths, "work", Template::Minimal, None).unwrap();

        let err = create_from_template(&paths, "work", Template::Minimal, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DevswitchError>(),
            Some(DevswitchError::ProfileExists(_))
        ));

        let err = create_from_current(&paths, "bad name", None, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DevswitchError>(),
            Some(DevswitchError::InvalidProfileName(_))
        ));
    }

    #[test]
    fn test_create_from_template() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);

        let written = create_from_template(&paths, "corp", Template::Corporate, None).unwrap();
        assert!(written.contains(&Target::Gitconfig));

        let profile = load_profile(&paths, "corp").unwrap();
        assert_eq!(profile.metadata.template.as_deref(), Some("corporate"));
        validate_json_file(&profile.entry(Target::Vscode).unwrap().source).unwrap();
    }

    #[test]
    fn test_load_unknown_profile() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);

        for name in ["ghost", "../etc"] {
            let err = load_profile(&paths, name).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<DevswitchError>(),
                Some(DevswitchError::UnknownProfile(_))
            ));
        }
    }

    #[test]
    fn test_profile_without_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let dir = paths.profile_dir("handmade");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(".npmrc"), "registry=x").unwrap();

        let profile = load_profile(&paths, "handmade").unwrap();
        assert_eq!(profile.metadata.name, "handmade");
        assert_eq!(profile.targets(), vec![Target::Npmrc]);
        assert_eq!(list_profiles(&paths).unwrap(), vec!["handmade"]);
    }

    #[test]
    fn test_rename_follows_active_marker() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_profile(&paths, "old-name", &[(Target::Gitconfig, "x")]);
        LockedState::lock(&paths.state_file)
            .unwrap()
            .update(|s| s.active_profile = Some("old-name".into()))
            .unwrap();

        rename_profile(&paths, "old-name", "new-name").unwrap();

        assert!(!paths.profile_dir("old-name").exists());
        assert_eq!(load_profile(&paths, "new-name").unwrap().metadata.name, "new-name");
        let state = State::read(&paths.state_file).unwrap();
        assert_eq!(state.active_profile.as_deref(), Some("new-name"));
    }

    #[test]
    fn test_remove_active_requires_force() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_profile(&paths, "work", &[(Target::Gitconfig, "x")]);
        LockedState::lock(&paths.state_file)
            .unwrap()
            .update(|s| s.active_profile = Some("work".into()))
            .unwrap();

        assert!(remove_profile(&paths, "work", false).is_err());
        assert!(profile_exists(&paths, "work"));

        remove_profile(&paths, "work", true).unwrap();
        assert!(!profile_exists(&paths, "work"));
        assert!(State::read(&paths.state_file).unwrap().active_profile.is_none());
    }
}
