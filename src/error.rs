//! Domain errors surfaced to the CLI with distinct exit codes.
//!
//! Plumbing failures travel as `anyhow::Error`; the variants here are the
//! ones a caller (or a script wrapping `devswitch`) needs to tell apart.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevswitchError {
    #[error("Profile '{0}' does not exist")]
    UnknownProfile(String),

    #[error("Cannot write {}: {source}", path.display())]
    TargetUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Another devswitch operation is in progress (lock held on {})", .0.display())]
    LockContention(PathBuf),

    #[error("Backup is missing or damaged: {0}")]
    CorruptBackup(String),

    #[error(
        "Invalid profile name '{0}'. Only alphanumeric characters, hyphens (-), and underscores (_) are allowed (max 64)."
    )]
    InvalidProfileName(String),

    #[error("Profile '{0}' already exists")]
    ProfileExists(String),

    #[error("Template '{0}' not found. Available templates: corporate, personal, minimal")]
    UnknownTemplate(String),

    #[error("Unknown target '{0}'")]
    UnknownTarget(String),
}

impl DevswitchError {
    /// Process exit code for this error kind
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownProfile(_) => 3,
            Self::TargetUnwritable { .. } => 4,
            Self::LockContention(_) => 5,
            Self::CorruptBackup(_) => 6,
            Self::InvalidProfileName(_)
            | Self::ProfileExists(_)
            | Self::UnknownTemplate(_)
            | Self::UnknownTarget(_) => 1,
        }
    }
}

/// Exit code for an arbitrary error chain
///
/// Walks the chain so a `DevswitchError` wrapped in extra context still maps
/// to its own code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<DevswitchError>())
        .map(DevswitchError::exit_code)
        .unwrap_or(1)
}
