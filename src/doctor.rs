//! Diagnostic tool for devswitch.
//!
//! This module implements the `devswitch doctor` command, which checks:
//! - Existence of the devswitch directories.
//! - The active profile marker: readable, not locked, no interrupted switch.
//! - Every profile's metadata and JSON targets.
//! - Integrity of the most recent snapshot.
//!
//! Each check prints its findings; the return value says whether any check
//! found a real problem.

use anstyle::AnsiColor;

use crate::backup::{latest_snapshot_id, load_snapshot};
use crate::config::Config;
use crate::paths::Paths;
use crate::profiles::{ProfileMetadata, list_profiles, load_profile, validate_json_file};
use crate::state::{State, is_locked};
use crate::ui::Ui;

/// Run the doctor diagnostics, returning `true` if everything is healthy
pub fn run_doctor(paths: &Paths, ui: &Ui) -> bool {
    ui.section("devswitch doctor");
    ui.newline();

    let mut healthy = true;

    healthy &= check_step(ui, "Directories", || {
        let mut ok = true;
        for (label, dir) in [
            ("Base directory", &paths.base_dir),
            ("Profiles directory", &paths.profiles_dir),
            ("Backups directory", &paths.backups_dir),
        ] {
            if dir.is_dir() {
                ui.item(1, ui.icon_ok(), format!("{}: {}", label, dir.display()));
            } else {
                ui.item(1, ui.icon_err(), format!("{} missing: {}", label, dir.display()));
                ok = false;
            }
        }
        ok
    });

    healthy &= check_step(ui, "Configuration", || match Config::read(&paths.config_file) {
        Ok(config) => {
            let source = if paths.config_file.exists() {
                "config.json"
            } else {
                "defaults"
            };
            ui.item(
                1,
                ui.icon_ok(),
                format!("Using {} (keeping {} snapshots)", source, config.retention()),
            );
            if !config.disabled_targets.is_empty() {
                let names: Vec<_> = config.disabled_targets.iter().map(|t| t.key()).collect();
                ui.item(1, ui.icon_info(), format!("Disabled targets: {}", names.join(", ")));
            }
            true
        }
        Err(e) => {
            ui.item(1, ui.icon_err(), format!("{:#}", e));
            false
        }
    });

    healthy &= check_step(ui, "State File", || {
        let state = match State::read(&paths.state_file) {
            Ok(state) => state,
            Err(e) => {
                ui.item(1, ui.icon_err(), format!("State file corrupt: {:#}", e));
                return false;
            }
        };

        let mut ok = true;
        if paths.state_file.exists() {
            ui.item(1, ui.icon_ok(), "State file readable");
        } else {
            ui.item(1, ui.icon_info(), "No state file yet (fresh install?)");
        }

        match is_locked(&paths.state_file) {
            Ok(true) => ui.item(
                1,
                ui.icon_warn(),
                "State is locked: another devswitch is running",
            ),
            Ok(false) => {}
            Err(e) => ui.item(1, ui.icon_warn(), format!("Could not probe lock: {:#}", e)),
        }

        match &state.active_profile {
            Some(profile) if paths.profile_dir(profile).is_dir() => {
                ui.item(1, ui.icon_ok(), format!("Active profile: {}", profile));
            }
            Some(profile) => {
                ui.item(1, ui.icon_err(), format!("Active profile '{}' no longer exists", profile));
                ok = false;
            }
            None => ui.item(1, ui.icon_info(), "No active profile set"),
        }

        if let Some(pending) = &state.pending_switch {
            ui.item(
                1,
                ui.icon_warn(),
                format!(
                    "Interrupted switch found (snapshot {}); the next switch or rollback restores it",
                    pending
                ),
            );
            ok = false;
        }
        ok
    });

    healthy &= check_step(ui, "Profiles", || {
        let profiles = match list_profiles(paths) {
            Ok(p) => p,
            Err(e) => {
                ui.item(1, ui.icon_err(), format!("Failed to list profiles: {:#}", e));
                return false;
            }
        };

        if profiles.is_empty() {
            ui.item(1, ui.icon_warn(), "No profiles found");
            return true;
        }

        ui.println(format!("  Found {} profile(s):", profiles.len()));
        let mut all_valid = true;

        for name in profiles {
            if let Err(e) = ProfileMetadata::read(&paths.profile_dir(&name)) {
                ui.item(2, ui.icon_err(), format!("{} (bad profile.json: {:#})", name, e));
                all_valid = false;
                continue;
            }

            let profile = match load_profile(paths, &name) {
                Ok(p) => p,
                Err(e) => {
                    ui.item(2, ui.icon_err(), format!("{} ({:#})", name, e));
                    all_valid = false;
                    continue;
                }
            };

            if profile.entries.is_empty() {
                ui.item(2, ui.icon_warn(), format!("{} (governs no files)", name));
                continue;
            }

            // Loose JSON (comments, trailing commas) is legal for VS Code, so only warn
            let loose_json: Vec<_> = profile
                .entries
                .iter()
                .filter(|e| e.target.is_json() && validate_json_file(&e.source).is_err())
                .map(|e| e.target.file_name())
                .collect();

            if loose_json.is_empty() {
                ui.item(
                    2,
                    ui.icon_ok(),
                    format!("{} ({} files)", name, profile.entries.len()),
                );
            } else {
                ui.item(
                    2,
                    ui.icon_warn(),
                    format!("{} (not strict JSON: {})", name, loose_json.join(", ")),
                );
            }
        }
        all_valid
    });

    healthy &= check_step(ui, "Backups", || match latest_snapshot_id(paths) {
        Ok(None) => {
            ui.item(1, ui.icon_info(), "No snapshots yet");
            true
        }
        Ok(Some(id)) => match load_snapshot(paths, &id) {
            Ok(manifest) => {
                ui.item(
                    1,
                    ui.icon_ok(),
                    format!("Latest snapshot {} ({} files)", id, manifest.entries.len()),
                );
                true
            }
            Err(e) => {
                ui.item(1, ui.icon_err(), format!("{:#}", e));
                false
            }
        },
        Err(e) => {
            ui.item(1, ui.icon_err(), format!("Failed to read backups: {:#}", e));
            false
        }
    });

    healthy
}

fn check_step<F>(ui: &Ui, name: &str, check_fn: F) -> bool
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    let success = check_fn();
    if !success {
        ui.println(ui.colored("  Issues detected!", AnsiColor::Red));
    }
    ui.newline();
    success
}
