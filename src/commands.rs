//! High-level command orchestration for the CLI.
//!
//! This module contains the handler functions for each CLI command (`list`,
//! `switch`, `create`, `backup`, ...). It is the coordination layer between:
//! - `crate::ui` for user interaction (output, prompts).
//! - `crate::profiles` and `crate::templates` for the profile store.
//! - `crate::switch` for switching, rollback and backups.
//! - `crate::diff` and `crate::doctor` for read-only inspection.
//!
//! Each function here corresponds to a subcommand in `main.rs`.

use anstyle::AnsiColor;
use anyhow::{Context, Result, bail};
use inquire::{Confirm, MultiSelect};

use crate::backup::{SnapshotKind, list_snapshot_ids, load_snapshot};
use crate::config::Config;
use crate::diff::{DiffReport, TargetDiff, diff_profile_current, diff_profiles, format_json_value};
use crate::doctor::run_doctor;
use crate::fs_utils::dir_size;
use crate::paths::Paths;
use crate::profiles::{
    create_from_current, create_from_template, list_profiles, load_profile, profile_exists,
    remove_profile, rename_profile, validate_profile_name,
};
use crate::state::State;
use crate::switch::{
    SwitchOptions, backup_now, clean_backups, rollback_to_snapshot, switch_to_profile,
};
use crate::targets::{Target, parse_targets};
use crate::templates::Template;
use crate::ui::Ui;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// List all available profiles
pub fn list(paths: &Paths, ui: &Ui) -> Result<()> {
    let profiles = list_profiles(paths)?;

    if profiles.is_empty() {
        ui.warn("No profiles found.");
        ui.newline();
        ui.println("Create one with:");
        ui.println(format!("  {} create <name>", ui.bold("devswitch")));
        ui.println(format!(
            "  {} create <name> --template corporate",
            ui.bold("devswitch")
        ));
        return Ok(());
    }

    let state = State::read(&paths.state_file).unwrap_or_default();
    let current = state.active_profile.as_deref();

    let mut table = ui.simple_table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("Profile"),
        ui.header_cell("Targets"),
        ui.header_cell("Description"),
        ui.header_cell("Status"),
    ]);

    for name in &profiles {
        let is_active = Some(name.as_str()) == current;
        let icon = if is_active { ui.icon_ok() } else { " " };
        let status_cell = if is_active {
            ui.colored_cell("active", AnsiColor::Green)
        } else {
            ui.cell("-")
        };

        let (targets, description) = match load_profile(paths, name) {
            Ok(profile) => {
                let keys: Vec<_> = profile.entries.iter().map(|e| e.target.key()).collect();
                (
                    keys.join(","),
                    profile.metadata.description.unwrap_or_default(),
                )
            }
            Err(_) => (String::from("?"), String::new()),
        };

        table.add_row(vec![
            ui.cell(icon),
            ui.cell(name),
            ui.cell(targets),
            ui.cell(description),
            status_cell,
        ]);
    }

    ui.section("Profiles");
    ui.println(table.to_string());

    Ok(())
}

/// Show the active profile and whether the live files still match it
pub fn current(paths: &Paths, ui: &Ui) -> Result<()> {
    let state = State::read(&paths.state_file)?;

    let mut lines = Vec::new();
    match &state.active_profile {
        Some(profile) => {
            lines.push(format!("Profile:       {}", ui.bold(profile)));
            if let Some(updated) = &state.updated_at {
                lines.push(format!(
                    "Last switched: {}",
                    updated.with_timezone(&chrono::Local).format(TIME_FORMAT)
                ));
            }
            if let Some(snapshot) = &state.last_snapshot {
                lines.push(format!("Last snapshot: {}", snapshot));
            }

            if profile_exists(paths, profile) {
                let report = diff_profile_current(paths, profile)?;
                let drifted: Vec<_> = report
                    .entries
                    .iter()
                    .filter(|(_, d)| !matches!(d, TargetDiff::Identical))
                    .map(|(t, _)| t.key())
                    .collect();
                if drifted.is_empty() {
                    lines.push(format!(
                        "Live files:    {}",
                        ui.colored("in sync", AnsiColor::Green)
                    ));
                } else {
                    lines.push(format!(
                        "Live files:    {}",
                        ui.colored(
                            format!("modified since switch ({})", drifted.join(", ")),
                            AnsiColor::Yellow
                        )
                    ));
                }
            } else {
                lines.push(ui.colored("Profile no longer exists in the store", AnsiColor::Red));
            }
        }
        None => lines.push(String::from("Profile:       (none)")),
    }

    ui.panel("Current Profile", lines.join("\n"));

    if let Some(pending) = &state.pending_switch {
        ui.warn(format!(
            "A switch was interrupted (snapshot {}). The next switch or rollback restores it.",
            pending
        ));
    }

    Ok(())
}

/// Switch to a profile
pub fn switch(
    paths: &Paths,
    config: &Config,
    name: &str,
    only: Option<Vec<String>>,
    dry_run: bool,
    ui: &Ui,
) -> Result<()> {
    let options = SwitchOptions {
        only: only.map(|o| parse_targets(&o)).transpose()?,
        dry_run,
    };

    let spinner = ui.spinner(format!("Switching to profile '{}'...", name));
    let report = match switch_to_profile(paths, config, name, &options) {
        Ok(report) => report,
        Err(e) => {
            ui.spinner_abandon(&spinner);
            return Err(e);
        }
    };

    if let Some(id) = &report.recovered {
        ui.warn(format!("Restored files from an interrupted switch (snapshot {})", id));
    }

    if report.dry_run {
        spinner.finish_and_clear();
        ui.info(format!("Dry run: switching to '{}' would", name));
        for target in &report.applied {
            ui.item(1, ui.icon_info(), format!("write {}", target.display_name()));
        }
        for target in &report.unchanged {
            ui.println(ui.dim(format!("  = keep {} (already matches)", target.display_name())));
        }
        for target in &report.skipped {
            ui.println(ui.dim(format!("  - skip {}", target.display_name())));
        }
        return Ok(());
    }

    let summary = if report.applied.is_empty() {
        format!("Already on '{}'; nothing to write", name)
    } else {
        format!(
            "Active profile: {} ({} file(s) written)",
            name,
            report.applied.len()
        )
    };
    ui.spinner_finish_ok(&spinner, summary);

    for target in &report.applied {
        ui.item(1, ui.icon_ok(), target.display_name());
    }
    for target in &report.skipped {
        ui.println(ui.dim(format!("  - {} (skipped)", target.display_name())));
    }
    if let Some(id) = &report.snapshot {
        ui.println(ui.dim(format!(
            "Previous files saved as snapshot {} (undo with 'devswitch rollback')",
            id
        )));
    }

    Ok(())
}

/// Interactive target selection for profile creation
pub fn select_targets(paths: &Paths) -> Result<Vec<Target>> {
    let all_targets = Target::all();

    let options: Vec<String> = all_targets
        .iter()
        .map(|t| {
            let exists = t.live_path(paths).exists();
            let indicator = if exists { "✓" } else { "✗" };
            let availability = if exists { "" } else { " (not found)" };
            format!("{} {}{}", indicator, t.display_name(), availability)
        })
        .collect();

    let defaults: Vec<usize> = all_targets
        .iter()
        .enumerate()
        .filter(|(_, t)| t.live_path(paths).exists())
        .map(|(i, _)| i)
        .collect();

    let selected = MultiSelect::new("Which files should this profile capture?", options.clone())
        .with_default(&defaults)
        .with_help_message("Space to select, Enter to confirm")
        .prompt()
        .context("Target selection cancelled")?;

    let targets: Vec<Target> = selected
        .into_iter()
        .filter_map(|choice| {
            options
                .iter()
                .position(|opt| *opt == choice)
                .map(|idx| all_targets[idx])
        })
        .collect();

    if targets.is_empty() {
        bail!(
            "At least one target must be selected.\nHint: Use Space to toggle targets, then press Enter to confirm."
        );
    }

    Ok(targets)
}

/// Create a new profile from the current live files or a template
pub fn create(
    paths: &Paths,
    name: &str,
    template: Option<String>,
    only: Option<Vec<String>>,
    select: bool,
    description: Option<String>,
    ui: &Ui,
) -> Result<()> {
    validate_profile_name(name)?;
    if profile_exists(paths, name) {
        bail!(
            "Profile '{}' already exists.\nHint: Remove it first or choose a different name.",
            name
        );
    }

    let (captured, source) = if let Some(template) = template {
        let template: Template = template.parse()?;
        let written = create_from_template(paths, name, template, description)?;
        (written, format!("template '{}'", template.name()))
    } else {
        let only = if select {
            Some(select_targets(paths)?)
        } else {
            only.map(|o| parse_targets(&o)).transpose()?
        };
        let captured = create_from_current(paths, name, only.as_deref(), description)?;
        (captured, String::from("current files"))
    };

    ui.ok(format!("Created profile '{}' from {}", name, source));
    if captured.is_empty() {
        ui.warn("No files were found to capture; the profile is empty.");
    } else {
        ui.newline();
        ui.println("Included files:");
        for target in &captured {
            ui.item(1, ui.icon_ok(), target.display_name());
        }
    }
    ui.newline();
    ui.println("To activate it:");
    ui.println(format!("  devswitch switch {}", name));

    Ok(())
}

/// Show detailed information about a profile
pub fn inspect(paths: &Paths, name: &str, ui: &Ui) -> Result<()> {
    let profile = load_profile(paths, name)?;
    let metadata = &profile.metadata;
    let state = State::read(&paths.state_file).unwrap_or_default();

    ui.section(format!("Profile: {}", name));
    ui.newline();

    let mut table = ui.simple_table();
    table.add_row(vec![
        ui.cell("Created:"),
        ui.cell(metadata.created_at.format(TIME_FORMAT).to_string()),
    ]);
    table.add_row(vec![
        ui.cell("Updated:"),
        ui.cell(metadata.updated_at.format(TIME_FORMAT).to_string()),
    ]);
    if let Some(description) = &metadata.description {
        table.add_row(vec![ui.cell("Description:"), ui.cell(description)]);
    }
    if let Some(template) = &metadata.template {
        table.add_row(vec![ui.cell("Template:"), ui.cell(template)]);
    }
    if state.active_profile.as_deref() == Some(name) {
        table.add_row(vec![
            ui.cell("Status:"),
            ui.colored_cell("active", AnsiColor::Green),
        ]);
    }
    ui.println(table.to_string());
    ui.newline();

    if profile.entries.is_empty() {
        ui.warn("This profile governs no files.");
        return Ok(());
    }

    ui.section("Governed Files");
    ui.newline();

    let drift = diff_profile_current(paths, name)?;

    let mut files = ui.simple_table();
    files.set_header(vec![
        ui.header_cell("Target"),
        ui.header_cell("Live path"),
        ui.header_cell("Size"),
        ui.header_cell("Live file"),
    ]);

    for entry in &profile.entries {
        let size = std::fs::metadata(&entry.source)
            .with_context(|| format!("Failed to read metadata for {}", entry.source.display()))?
            .len();

        let live_cell = match drift.entries.iter().find(|(t, _)| *t == entry.target) {
            Some((_, TargetDiff::Identical)) => ui.colored_cell("matches", AnsiColor::Green),
            Some((_, TargetDiff::MissingRight)) => ui.colored_cell("missing", AnsiColor::Yellow),
            _ => ui.colored_cell("differs", AnsiColor::Yellow),
        };

        files.add_row(vec![
            ui.cell(entry.target.key()),
            ui.cell(entry.target.live_path(paths).display().to_string()),
            ui.cell(format_bytes(size)),
            live_cell,
        ]);
    }

    ui.println(files.to_string());
    Ok(())
}

/// Compare two profiles, or a profile against the live files
pub fn diff(paths: &Paths, left: &str, right: Option<&str>, ui: &Ui) -> Result<()> {
    let report = match right {
        Some(right) => diff_profiles(paths, left, right)?,
        None => diff_profile_current(paths, left)?,
    };

    ui.section(format!("Comparing '{}' with '{}'", report.left, report.right));
    ui.newline();

    if report.entries.is_empty() {
        ui.info("Neither side governs any files.");
        return Ok(());
    }

    if report.is_identical() {
        ui.ok("No differences found");
        return Ok(());
    }

    print_diff_report(&report, ui);
    Ok(())
}

fn print_diff_report(report: &DiffReport, ui: &Ui) {
    let mut table = ui.table();
    table.set_header(vec![
        ui.header_cell("Target"),
        ui.header_cell("Key"),
        ui.header_cell(&report.left),
        ui.header_cell(&report.right),
    ]);

    let mut differing = 0;
    for (target, diff) in &report.entries {
        match diff {
            TargetDiff::Identical => {}
            TargetDiff::MissingLeft => {
                differing += 1;
                table.add_row(vec![
                    ui.cell(target.key()),
                    ui.cell(""),
                    ui.colored_cell("(missing)", AnsiColor::Red),
                    ui.cell("present"),
                ]);
            }
            TargetDiff::MissingRight => {
                differing += 1;
                table.add_row(vec![
                    ui.cell(target.key()),
                    ui.cell(""),
                    ui.cell("present"),
                    ui.colored_cell("(missing)", AnsiColor::Red),
                ]);
            }
            TargetDiff::Differs { keys } if keys.is_empty() => {
                differing += 1;
                table.add_row(vec![
                    ui.cell(target.key()),
                    ui.cell(""),
                    ui.colored_cell("content differs", AnsiColor::Yellow),
                    ui.colored_cell("content differs", AnsiColor::Yellow),
                ]);
            }
            TargetDiff::Differs { keys } => {
                differing += 1;
                for key in keys {
                    table.add_row(vec![
                        ui.cell(target.key()),
                        ui.cell(&key.key),
                        ui.cell(format_json_value(&key.left)),
                        ui.cell(format_json_value(&key.right)),
                    ]);
                }
            }
        }
    }

    ui.println(table.to_string());
    ui.newline();
    ui.info(format!("{} file(s) differ", differing));
}

/// Take a manual snapshot of the live files
pub fn backup_create(paths: &Paths, config: &Config, ui: &Ui) -> Result<()> {
    let manifest = backup_now(paths, config)?;
    let present = manifest.entries.iter().filter(|e| e.existed).count();
    ui.ok(format!(
        "Created snapshot {} ({} file(s) saved)",
        manifest.id, present
    ));
    Ok(())
}

/// List all snapshots, newest first
pub fn backup_list(paths: &Paths, ui: &Ui) -> Result<()> {
    let ids = list_snapshot_ids(paths)?;
    if ids.is_empty() {
        ui.warn("No backups found.");
        ui.newline();
        ui.println("Backups are created automatically when switching profiles.");
        return Ok(());
    }

    ui.section("Backups");
    ui.newline();

    let mut table = ui.table();
    table.set_header(vec![
        ui.header_cell("ID"),
        ui.header_cell("Kind"),
        ui.header_cell("Date"),
        ui.header_cell("Profiles"),
        ui.header_cell("Files"),
        ui.header_cell("Size"),
    ]);

    for id in ids.iter().rev() {
        let size = dir_size(&paths.snapshot_dir(id)).unwrap_or(0);
        match load_snapshot(paths, id) {
            Ok(manifest) => {
                let kind = match manifest.kind {
                    SnapshotKind::Switch => "switch",
                    SnapshotKind::Manual => "manual",
                };
                let profiles = format!(
                    "{} → {}",
                    manifest.from_profile.as_deref().unwrap_or("-"),
                    manifest.to_profile.as_deref().unwrap_or("-")
                );
                table.add_row(vec![
                    ui.cell(id),
                    ui.cell(kind),
                    ui.cell(
                        manifest
                            .created_at
                            .with_timezone(&chrono::Local)
                            .format(TIME_FORMAT)
                            .to_string(),
                    ),
                    ui.cell(profiles),
                    ui.cell(manifest.entries.len().to_string()),
                    ui.cell(format_bytes(size)),
                ]);
            }
            Err(_) => {
                table.add_row(vec![
                    ui.cell(id),
                    ui.colored_cell("corrupt", AnsiColor::Red),
                    ui.cell("-"),
                    ui.cell("-"),
                    ui.cell("-"),
                    ui.cell(format_bytes(size)),
                ]);
            }
        }
    }

    ui.println(table.to_string());
    ui.newline();
    ui.info(format!("{} backup(s) found", ids.len()));

    Ok(())
}

/// Remove old snapshots
pub fn backup_clean(paths: &Paths, keep: usize, ui: &Ui) -> Result<()> {
    let removed = clean_backups(paths, keep)?;

    if removed > 0 {
        ui.ok(format!(
            "Removed {} old backup(s), keeping the newest {}",
            removed, keep
        ));
    } else {
        ui.ok(format!("No backups to clean (keeping {})", keep));
    }

    Ok(())
}

/// Restore a snapshot, the latest one by default
pub fn rollback(paths: &Paths, id: Option<&str>, yes: bool, ui: &Ui) -> Result<()> {
    if !yes {
        let which = match id {
            Some(id) => format!("snapshot {}", id),
            None => String::from("the latest snapshot"),
        };
        let confirm = Confirm::new(&format!("Restore live files from {}?", which))
            .with_default(false)
            .with_help_message("This overwrites the current live files")
            .prompt()
            .context("Confirmation cancelled")?;

        if !confirm {
            ui.warn("Rollback cancelled.");
            return Ok(());
        }
    }

    let spinner = ui.spinner("Rolling back...");
    let report = match rollback_to_snapshot(paths, id) {
        Ok(report) => report,
        Err(e) => {
            ui.spinner_abandon(&spinner);
            return Err(e);
        }
    };

    if let Some(recovered) = &report.recovered {
        ui.warn(format!(
            "Restored files from an interrupted switch (snapshot {})",
            recovered
        ));
    }
    ui.spinner_finish_ok(
        &spinner,
        format!(
            "Restored {} file(s) from snapshot {}",
            report.restored.len(),
            report.snapshot
        ),
    );
    match &report.active_profile {
        Some(profile) => ui.println(format!("Active profile: {}", profile)),
        None => ui.println("Active profile: (none)"),
    }

    Ok(())
}

/// Remove a profile
pub fn remove(paths: &Paths, name: &str, force: bool, ui: &Ui) -> Result<()> {
    load_profile(paths, name)?;

    let state = State::read(&paths.state_file).unwrap_or_default();
    let is_active = state.active_profile.as_deref() == Some(name);

    if is_active && !force {
        bail!(
            "Cannot remove '{}' because it is the currently active profile.\nHint: Switch to another profile first, or pass --force.",
            name
        );
    }

    if !force {
        let confirm = Confirm::new(&format!(
            "Are you sure you want to remove profile '{}'?",
            name
        ))
        .with_default(false)
        .with_help_message("This permanently deletes the profile and its files")
        .prompt()
        .context("Confirmation cancelled")?;

        if !confirm {
            ui.warn("Removal cancelled.");
            return Ok(());
        }
    }

    remove_profile(paths, name, force)?;

    if is_active {
        ui.ok(format!(
            "Removed profile '{}' (no profile is active now; live files were left as they are)",
            name
        ));
    } else {
        ui.ok(format!("Removed profile '{}'", name));
    }
    Ok(())
}

/// Rename a profile
pub fn rename(paths: &Paths, old_name: &str, new_name: &str, ui: &Ui) -> Result<()> {
    let was_active =
        State::read(&paths.state_file).unwrap_or_default().active_profile.as_deref() == Some(old_name);

    rename_profile(paths, old_name, new_name)?;

    if was_active {
        ui.ok(format!(
            "Renamed profile '{}' to '{}' (still active)",
            old_name, new_name
        ));
    } else {
        ui.ok(format!("Renamed profile '{}' to '{}'", old_name, new_name));
    }
    Ok(())
}

/// Run diagnostics
pub fn doctor(paths: &Paths, ui: &Ui) -> Result<()> {
    if !run_doctor(paths, ui) {
        bail!("devswitch doctor found problems (see above)");
    }
    ui.ok("Everything looks good");
    Ok(())
}

/// List the files devswitch can manage
pub fn targets(paths: &Paths, config: &Config, ui: &Ui) -> Result<()> {
    let mut table = ui.simple_table();
    table.set_header(vec![
        ui.header_cell("Target"),
        ui.header_cell("Description"),
        ui.header_cell("Live path"),
        ui.header_cell("Status"),
    ]);

    for target in Target::all() {
        let live = target.live_path(paths);
        let status = if !config.is_enabled(target) {
            ui.colored_cell("disabled", AnsiColor::Yellow)
        } else if live.exists() {
            ui.colored_cell("present", AnsiColor::Green)
        } else {
            ui.cell("-")
        };
        table.add_row(vec![
            ui.cell(target.key()),
            ui.cell(target.display_name()),
            ui.cell(live.display().to_string()),
            status,
        ]);
    }

    ui.section("Targets");
    ui.println(table.to_string());
    Ok(())
}

/// Format bytes as human-readable string
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
