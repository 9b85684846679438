//! Profile switching logic.
//!
//! This module implements the core mechanism of `devswitch`: making a
//! profile's files the live files. A switch is all-or-nothing:
//! - The state lock is taken first; a second concurrent switch fails fast.
//! - A snapshot of every file about to change is persisted and recorded as
//!   `pending_switch` before anything is overwritten.
//! - Files are written in canonical target order, each one backed up into
//!   the [`Transaction`] journal right before it is replaced.
//! - On the first failure the journal is rolled back and the error returned.
//! - If the process dies mid-switch, the next locked operation finds
//!   `pending_switch` and restores the snapshot.

use anyhow::Result;
use std::path::PathBuf;

use crate::backup::{
    SnapshotKind, SnapshotManifest, Transaction, create_snapshot, latest_snapshot_id,
    prune_snapshots, remove_snapshot, restore_snapshot,
};
use crate::config::Config;
use crate::error::DevswitchError;
use crate::fs_utils::{atomic_write, file_mode, read_optional, resolve_symlinks};
use crate::paths::Paths;
use crate::profiles::{Profile, load_profile};
use crate::state::{LockedState, State};
use crate::targets::Target;

#[derive(Debug, Clone, Default)]
pub struct SwitchOptions {
    /// Restrict the switch to these targets
    pub only: Option<Vec<Target>>,
    /// Compute the plan without touching anything
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    /// Live content differs and will be replaced
    Write,
    /// Live content already matches the profile
    Unchanged,
    /// Excluded by `--only`
    NotSelected,
    /// Excluded by `disabled_targets` in the config
    Disabled,
}

/// What a switch will do to one target
#[derive(Debug, Clone)]
pub struct PlannedTarget {
    pub target: Target,
    /// Live path after following symlinks
    pub live_path: PathBuf,
    pub action: PlanAction,
    content: Vec<u8>,
    mode: Option<u32>,
}

/// Outcome of a switch
#[derive(Debug, Clone, Default)]
pub struct SwitchReport {
    pub profile: String,
    pub previous: Option<String>,
    pub applied: Vec<Target>,
    pub unchanged: Vec<Target>,
    pub skipped: Vec<Target>,
    /// Snapshot holding the pre-switch content of `applied`
    pub snapshot: Option<String>,
    /// Interrupted switch that was rolled back before this one ran
    pub recovered: Option<String>,
    pub dry_run: bool,
}

/// Outcome of a rollback
#[derive(Debug, Clone)]
pub struct RollbackReport {
    pub snapshot: String,
    pub restored: Vec<Target>,
    pub active_profile: Option<String>,
    pub recovered: Option<String>,
}

/// Work out what switching to `profile` would change
pub fn plan_switch(
    paths: &Paths,
    config: &Config,
    profile: &Profile,
    only: Option<&[Target]>,
) -> Result<Vec<PlannedTarget>> {
    let mut plan = Vec::with_capacity(profile.entries.len());

    for entry in &profile.entries {
        let live_path = resolve_symlinks(&entry.target.live_path(paths));
        let content = entry.read()?;

        let action = if only.is_some_and(|o| !o.contains(&entry.target)) {
            PlanAction::NotSelected
        } else if !config.is_enabled(entry.target) {
            PlanAction::Disabled
        } else {
            match read_optional(&live_path) {
                Ok(Some(current)) if current == content => PlanAction::Unchanged,
                _ => PlanAction::Write,
            }
        };

        // Keep the live file's permissions; new files take the profile file's
        let mode = file_mode(&live_path).or_else(|| file_mode(&entry.source));

        plan.push(PlannedTarget {
            target: entry.target,
            live_path,
            action,
            content,
            mode,
        });
    }

    Ok(plan)
}

/// Roll back a switch that never finished, if the marker says there is one
///
/// Returns the id of the snapshot that was restored.
pub fn recover_interrupted(paths: &Paths, locked: &mut LockedState) -> Result<Option<String>> {
    let Some(id) = locked.state().pending_switch.clone() else {
        return Ok(None);
    };

    tracing::warn!(snapshot = %id, "found interrupted switch, restoring pre-switch files");
    restore_snapshot(paths, &id)?;
    locked.update(|s| s.pending_switch = None)?;
    Ok(Some(id))
}

fn apply_target(tx: &mut Transaction, item: &PlannedTarget) -> Result<()> {
    tx.backup(&item.live_path)?;
    atomic_write(&item.live_path, &item.content, item.mode).map_err(|source| {
        DevswitchError::TargetUnwritable {
            path: item.live_path.clone(),
            source,
        }
    })?;
    tracing::debug!(file = item.target.key(), path = %item.live_path.display(), "applied");
    Ok(())
}

/// Switch to a specific profile
pub fn switch_to_profile(
    paths: &Paths,
    config: &Config,
    name: &str,
    options: &SwitchOptions,
) -> Result<SwitchReport> {
    if options.dry_run {
        let profile = load_profile(paths, name)?;
        let plan = plan_switch(paths, config, &profile, options.only.as_deref())?;
        let previous = State::read(&paths.state_file)?.active_profile;
        return Ok(build_report(name, previous, &plan, None, None, true));
    }

    paths.ensure_dirs()?;
    let mut locked = LockedState::lock(&paths.state_file)?;
    let recovered = recover_interrupted(paths, &mut locked)?;

    let profile = load_profile(paths, name)?;
    let plan = plan_switch(paths, config, &profile, options.only.as_deref())?;
    let previous = locked.state().active_profile.clone();

    let writes: Vec<&PlannedTarget> = plan
        .iter()
        .filter(|p| p.action == PlanAction::Write)
        .collect();

    let snapshot = if writes.is_empty() {
        None
    } else {
        let targets: Vec<Target> = writes.iter().map(|p| p.target).collect();
        let manifest = create_snapshot(
            paths,
            &targets,
            SnapshotKind::Switch,
            previous.as_deref(),
            Some(name),
        )?;
        let id = manifest.id.clone();
        locked.update(|s| s.pending_switch = Some(id))?;
        Some(manifest.id)
    };

    let mut tx = Transaction::new();
    for item in &writes {
        if let Err(e) = apply_target(&mut tx, item) {
            tracing::warn!(profile = name, error = %e, "switch failed, rolling back");
            if let Err(rb) = tx.rollback() {
                // Leave pending_switch set so the next run restores the snapshot
                return Err(e.context(format!("rollback incomplete: {:#}", rb)));
            }
            locked.update(|s| s.pending_switch = None)?;
            if let Some(id) = &snapshot {
                let removed = remove_snapshot(paths, id);
                if let Err(err) = removed {
                    tracing::warn!(
                        snapshot = %id,
                        error = %err,
                        "failed to remove snapshot of failed switch"
                    );
                }
            }
            return Err(e);
        }
    }
    tx.commit();

    locked.update(|s| {
        s.active_profile = Some(name.to_string());
        s.pending_switch = None;
        if snapshot.is_some() {
            s.last_snapshot = snapshot.clone();
        }
    })?;

    let pruned = prune_snapshots(paths, config.retention())?;
    if pruned > 0 {
        tracing::debug!(pruned, "old snapshots removed");
    }

    tracing::info!(profile = name, applied = writes.len(), "switch complete");
    Ok(build_report(name, previous, &plan, snapshot, recovered, false))
}

fn build_report(
    name: &str,
    previous: Option<String>,
    plan: &[PlannedTarget],
    snapshot: Option<String>,
    recovered: Option<String>,
    dry_run: bool,
) -> SwitchReport {
    let pick = |want: &[PlanAction]| -> Vec<Target> {
        plan.iter()
            .filter(|p| want.contains(&p.action))
            .map(|p| p.target)
            .collect()
    };

    SwitchReport {
        profile: name.to_string(),
        previous,
        applied: pick(&[PlanAction::Write]),
        unchanged: pick(&[PlanAction::Unchanged]),
        skipped: pick(&[PlanAction::NotSelected, PlanAction::Disabled]),
        snapshot,
        recovered,
        dry_run,
    }
}

/// Restore a snapshot (the latest when `id` is `None`)
///
/// The active marker is set back to the profile that was active when the
/// snapshot was taken.
pub fn rollback_to_snapshot(paths: &Paths, id: Option<&str>) -> Result<RollbackReport> {
    let mut locked = LockedState::lock(&paths.state_file)?;
    let recovered = recover_interrupted(paths, &mut locked)?;

    let id = match id {
        Some(id) => id.to_string(),
        None => latest_snapshot_id(paths)?.ok_or_else(|| {
            DevswitchError::CorruptBackup("no snapshots available to roll back to".to_string())
        })?,
    };

    let manifest = crate::backup::load_snapshot(paths, &id)?;
    let restored = restore_snapshot(paths, &id)?;

    let active = manifest.from_profile.clone();
    locked.update(|s| {
        s.active_profile = active.clone();
        s.pending_switch = None;
    })?;

    tracing::info!(snapshot = %id, "rollback complete");
    Ok(RollbackReport {
        snapshot: id,
        restored,
        active_profile: active,
        recovered,
    })
}

/// Take a manual snapshot of every enabled target
pub fn backup_now(paths: &Paths, config: &Config) -> Result<SnapshotManifest> {
    let mut locked = LockedState::lock(&paths.state_file)?;
    recover_interrupted(paths, &mut locked)?;

    let targets: Vec<Target> = Target::all()
        .into_iter()
        .filter(|t| config.is_enabled(*t))
        .collect();
    let active = locked.state().active_profile.clone();
    let manifest = create_snapshot(paths, &targets, SnapshotKind::Manual, active.as_deref(), None)?;

    prune_snapshots(paths, config.retention())?;
    Ok(manifest)
}

/// Delete old snapshots down to `keep`, under the state lock
///
/// An interrupted switch is recovered first so its snapshot is never pruned
/// before it has been restored.
pub fn clean_backups(paths: &Paths, keep: usize) -> Result<usize> {
    let mut locked = LockedState::lock(&paths.state_file)?;
    recover_interrupted(paths, &mut locked)?;
    let removed = prune_snapshots(paths, keep)?;
    tracing::info!(removed, keep, "backups cleaned");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::list_snapshot_ids;
    use crate::error::exit_code_for;
    use crate::test_utils::{read_live, setup_test_paths, write_live, write_profile};
    use std::fs;
    use tempfile::TempDir;

    fn switch(paths: &Paths, name: &str) -> Result<SwitchReport> {
        switch_to_profile(paths, &Config::default(), name, &SwitchOptions::default())
    }

    fn live_snapshot(paths: &Paths) -> Vec<(Target, Option<Vec<u8>>)> {
        Target::all()
            .into_iter()
            .map(|t| (t, fs::read(t.live_path(paths)).ok()))
            .collect()
    }

    fn setup_work_and_personal(paths: &Paths) {
        write_profile(
            paths,
            "work",
            &[
                (Target::Gitconfig, "[user]\n\temail = me@corp.com\n"),
                (Target::Zshrc, "export WORK=1\n"),
            ],
        );
        write_profile(
            paths,
            "personal",
            &[
                (Target::Gitconfig, "[user]\n\temail = me@home.org\n"),
                (Target::Zshrc, "export HOME_SETUP=1\n"),
            ],
        );
    }

    #[test]
    fn test_switch_writes_files_and_marker() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);

        let report = switch(&paths, "work").unwrap();
        assert_eq!(report.applied, vec![Target::Gitconfig, Target::Zshrc]);
        assert!(report.snapshot.is_some());
        assert_eq!(
            read_live(&paths, Target::Gitconfig).as_deref(),
            Some("[user]\n\temail = me@corp.com\n")
        );

        let state = State::read(&paths.state_file).unwrap();
        assert_eq!(state.active_profile.as_deref(), Some("work"));
        assert!(state.pending_switch.is_none());
    }

    #[test]
    fn test_switch_twice_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);

        switch(&paths, "work").unwrap();
        let after_first = live_snapshot(&paths);
        let snapshots_after_first = list_snapshot_ids(&paths).unwrap();

        let report = switch(&paths, "work").unwrap();
        assert!(report.applied.is_empty());
        assert_eq!(report.unchanged, vec![Target::Gitconfig, Target::Zshrc]);
        assert!(report.snapshot.is_none());
        assert_eq!(live_snapshot(&paths), after_first);
        assert_eq!(list_snapshot_ids(&paths).unwrap(), snapshots_after_first);
    }

    #[test]
    fn test_switch_back_restores_bytes() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);

        switch(&paths, "work").unwrap();
        let before = live_snapshot(&paths);

        switch(&paths, "personal").unwrap();
        assert_ne!(live_snapshot(&paths), before);

        let report = switch(&paths, "work").unwrap();
        assert_eq!(report.previous.as_deref(), Some("personal"));
        assert_eq!(live_snapshot(&paths), before);
    }

    #[test]
    fn test_failed_write_leaves_no_changes() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);
        write_profile(
            &paths,
            "cloud",
            &[
                (Target::Gitconfig, "[user]\n\temail = me@cloud.io\n"),
                (Target::Zshrc, "export CLOUD=1\n"),
                (Target::AwsConfig, "[default]\nregion = eu-west-1\n"),
            ],
        );
        switch(&paths, "work").unwrap();
        let before = live_snapshot(&paths);
        let snapshots_before = list_snapshot_ids(&paths).unwrap();

        // ~/.aws is a file, so ~/.aws/config cannot be created
        fs::write(paths.home_dir.join(".aws"), "not a directory").unwrap();

        let err = switch(&paths, "cloud").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DevswitchError>(),
            Some(DevswitchError::TargetUnwritable { .. })
        ));
        assert_eq!(exit_code_for(&err), 4);

        assert_eq!(live_snapshot(&paths), before);
        let state = State::read(&paths.state_file).unwrap();
        assert_eq!(state.active_profile.as_deref(), Some("work"));
        assert!(state.pending_switch.is_none());
        assert_eq!(list_snapshot_ids(&paths).unwrap(), snapshots_before);

        // The blocking path is still there; other operations keep working
        switch(&paths, "personal").unwrap();
        switch(&paths, "work").unwrap();
        assert_eq!(live_snapshot(&paths), before);
        backup_now(&paths, &Config::default()).unwrap();
    }

    #[test]
    fn test_unreadable_target_aborts_before_writing() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);
        write_profile(
            &paths,
            "node",
            &[
                (Target::Gitconfig, "[user]\n\temail = me@node.dev\n"),
                (Target::Npmrc, "registry=https://npm.node.dev/\n"),
            ],
        );
        switch(&paths, "personal").unwrap();
        switch(&paths, "work").unwrap();
        let before = live_snapshot(&paths);
        let snapshots_before = list_snapshot_ids(&paths).unwrap();

        // A directory where ~/.npmrc should be cannot be captured
        fs::create_dir_all(Target::Npmrc.live_path(&paths)).unwrap();

        let err = switch(&paths, "node").unwrap_err();
        assert_eq!(exit_code_for(&err), 4);
        assert_eq!(live_snapshot(&paths), before);
        assert_eq!(list_snapshot_ids(&paths).unwrap(), snapshots_before);
        let state = State::read(&paths.state_file).unwrap();
        assert_eq!(state.active_profile.as_deref(), Some("work"));
        assert!(state.pending_switch.is_none());

        // Rollback still finds the last real snapshot (taken before "work")
        rollback_to_snapshot(&paths, None).unwrap();
        let state = State::read(&paths.state_file).unwrap();
        assert_eq!(state.active_profile.as_deref(), Some("personal"));
    }

    #[test]
    fn test_concurrent_switch_is_rejected() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);
        switch(&paths, "work").unwrap();
        let before = live_snapshot(&paths);

        let _held = LockedState::lock(&paths.state_file).unwrap();
        let err = switch(&paths, "personal").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DevswitchError>(),
            Some(DevswitchError::LockContention(_))
        ));
        assert_eq!(live_snapshot(&paths), before);
    }

    #[test]
    fn test_unknown_profile() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);

        let err = switch(&paths, "nonexistent").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DevswitchError>(),
            Some(DevswitchError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_only_leaves_other_targets_alone() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);
        switch(&paths, "work").unwrap();

        let options = SwitchOptions {
            only: Some(vec![Target::Gitconfig]),
            dry_run: false,
        };
        let report =
            switch_to_profile(&paths, &Config::default(), "personal", &options).unwrap();

        assert_eq!(report.applied, vec![Target::Gitconfig]);
        assert_eq!(report.skipped, vec![Target::Zshrc]);
        assert_eq!(
            read_live(&paths, Target::Zshrc).as_deref(),
            Some("export WORK=1\n")
        );
    }

    #[test]
    fn test_disabled_targets_are_skipped() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);
        let config = Config {
            disabled_targets: vec![Target::Zshrc],
            ..Config::default()
        };

        let report =
            switch_to_profile(&paths, &config, "work", &SwitchOptions::default()).unwrap();
        assert_eq!(report.skipped, vec![Target::Zshrc]);
        assert!(read_live(&paths, Target::Zshrc).is_none());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);

        let options = SwitchOptions {
            only: None,
            dry_run: true,
        };
        let report = switch_to_profile(&paths, &Config::default(), "work", &options).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.applied, vec![Target::Gitconfig, Target::Zshrc]);
        assert!(read_live(&paths, Target::Gitconfig).is_none());
        assert!(State::read(&paths.state_file).unwrap().active_profile.is_none());
    }

    #[test]
    fn test_interrupted_switch_is_recovered() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);
        switch(&paths, "work").unwrap();
        let before = live_snapshot(&paths);

        // Simulate a crash halfway through switching to personal
        let manifest = create_snapshot(
            &paths,
            &[Target::Gitconfig, Target::Zshrc],
            SnapshotKind::Switch,
            Some("work"),
            Some("personal"),
        )
        .unwrap();
        LockedState::lock(&paths.state_file)
            .unwrap()
            .update(|s| s.pending_switch = Some(manifest.id.clone()))
            .unwrap();
        write_live(&paths, Target::Gitconfig, "[user]\n\temail = me@home.org\n");

        {
            let mut locked = LockedState::lock(&paths.state_file).unwrap();
            let recovered = recover_interrupted(&paths, &mut locked).unwrap();
            assert_eq!(recovered.as_deref(), Some(manifest.id.as_str()));
            assert!(locked.state().pending_switch.is_none());
            assert_eq!(locked.state().active_profile.as_deref(), Some("work"));
        }
        assert_eq!(live_snapshot(&paths), before);
    }

    #[test]
    fn test_switch_recovers_before_applying() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);
        switch(&paths, "work").unwrap();

        let manifest = create_snapshot(
            &paths,
            &[Target::Gitconfig],
            SnapshotKind::Switch,
            Some("work"),
            Some("personal"),
        )
        .unwrap();
        LockedState::lock(&paths.state_file)
            .unwrap()
            .update(|s| s.pending_switch = Some(manifest.id.clone()))
            .unwrap();
        write_live(&paths, Target::Gitconfig, "half written");

        let report = switch(&paths, "work").unwrap();
        assert_eq!(report.recovered.as_deref(), Some(manifest.id.as_str()));
        assert!(report.applied.is_empty());
        assert_eq!(
            read_live(&paths, Target::Gitconfig).as_deref(),
            Some("[user]\n\temail = me@corp.com\n")
        );
    }

    #[test]
    fn test_rollback_restores_pre_switch_state() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);
        write_profile(
            &paths,
            "node",
            &[
                (Target::Gitconfig, "[user]\n\temail = me@node.dev\n"),
                (Target::Npmrc, "registry=https://npm.example\n"),
            ],
        );
        switch(&paths, "work").unwrap();
        let before = live_snapshot(&paths);

        switch(&paths, "node").unwrap();
        assert!(read_live(&paths, Target::Npmrc).is_some());

        let report = rollback_to_snapshot(&paths, None).unwrap();
        assert_eq!(report.restored, vec![Target::Gitconfig, Target::Npmrc]);
        assert_eq!(report.active_profile.as_deref(), Some("work"));
        assert_eq!(live_snapshot(&paths), before);
        assert!(read_live(&paths, Target::Npmrc).is_none());

        let state = State::read(&paths.state_file).unwrap();
        assert_eq!(state.active_profile.as_deref(), Some("work"));
    }

    #[test]
    fn test_rollback_without_snapshots_is_corrupt_backup() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);

        let err = rollback_to_snapshot(&paths, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DevswitchError>(),
            Some(DevswitchError::CorruptBackup(_))
        ));
    }

    #[test]
    fn test_snapshots_pruned_to_retention() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);
        let config = Config {
            max_backups: 2,
            ..Config::default()
        };

        for name in ["work", "personal", "work", "personal"] {
            switch_to_profile(&paths, &config, name, &SwitchOptions::default()).unwrap();
        }
        assert_eq!(list_snapshot_ids(&paths).unwrap().len(), 2);

        let state = State::read(&paths.state_file).unwrap();
        assert_eq!(
            state.last_snapshot,
            list_snapshot_ids(&paths).unwrap().pop()
        );
    }

    #[test]
    fn test_backup_now_captures_enabled_targets() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        write_live(&paths, Target::Gitconfig, "[user]");

        let manifest = backup_now(&paths, &Config::default()).unwrap();
        assert_eq!(manifest.kind, SnapshotKind::Manual);
        assert_eq!(manifest.entries.len(), Target::all().len());
        let existing: Vec<_> = manifest
            .entries
            .iter()
            .filter(|e| e.existed)
            .map(|e| e.target)
            .collect();
        assert_eq!(existing, vec![Target::Gitconfig]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_target_written_through() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        setup_work_and_personal(&paths);

        let real = paths.home_dir.join("dotfiles/gitconfig");
        fs::create_dir_all(real.parent().unwrap()).unwrap();
        fs::write(&real, "original").unwrap();
        std::os::unix::fs::symlink(&real, Target::Gitconfig.live_path(&paths)).unwrap();

        switch(&paths, "work").unwrap();

        let link_meta = fs::symlink_metadata(Target::Gitconfig.live_path(&paths)).unwrap();
        assert!(link_meta.file_type().is_symlink());
        assert_eq!(
            fs::read_to_string(&real).unwrap(),
            "[user]\n\temail = me@corp.com\n"
        );
    }
}
