use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::DevswitchError;
use crate::paths::Paths;

/// Live configuration files a profile can govern
///
/// Variant order is the canonical application order: every switch walks
/// targets in this order, so a retried switch touches files identically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    Gitconfig,
    Zshrc,
    Bashrc,
    Profile,
    Env,
    Vscode,
    Ssh,
    Npmrc,
    Yarnrc,
    Docker,
    AwsConfig,
    AwsCredentials,
}

impl Target {
    /// Get all targets in canonical order
    pub fn all() -> Vec<Target> {
        vec![
            Target::Gitconfig,
            Target::Zshrc,
            Target::Bashrc,
            Target::Profile,
            Target::Env,
            Target::Vscode,
            Target::Ssh,
            Target::Npmrc,
            Target::Yarnrc,
            Target::Docker,
            Target::AwsConfig,
            Target::AwsCredentials,
        ]
    }

    /// Name of the file holding this target inside a profile or snapshot
    pub fn file_name(&self) -> &'static str {
        match self {
            Target::Gitconfig => ".gitconfig",
            Target::Zshrc => ".zshrc",
            Target::Bashrc => ".bashrc",
            Target::Profile => ".profile",
            Target::Env => ".env",
            Target::Vscode => "settings.json",
            Target::Ssh => "ssh_config",
            Target::Npmrc => ".npmrc",
            Target::Yarnrc => ".yarnrc",
            Target::Docker => "docker_config.json",
            Target::AwsConfig => "aws_config",
            Target::AwsCredentials => "aws_credentials",
        }
    }

    /// Get the live location of this target
    pub fn live_path(&self, paths: &Paths) -> PathBuf {
        let home = &paths.home_dir;
        match self {
            Target::Gitconfig => home.join(".gitconfig"),
            Target::Zshrc => home.join(".zshrc"),
            Target::Bashrc => home.join(".bashrc"),
            Target::Profile => home.join(".profile"),
            Target::Env => home.join(".env"),
            Target::Vscode => paths
                .config_dir
                .join("Code")
                .join("User")
                .join("settings.json"),
            Target::Ssh => home.join(".ssh").join("config"),
            Target::Npmrc => home.join(".npmrc"),
            Target::Yarnrc => home.join(".yarnrc"),
            Target::Docker => home.join(".docker").join("config.json"),
            Target::AwsConfig => home.join(".aws").join("config"),
            Target::AwsCredentials => home.join(".aws").join("credentials"),
        }
    }

    /// Get the path of this target inside a profile
    pub fn profile_path(&self, paths: &Paths, profile: &str) -> PathBuf {
        paths.profile_dir(profile).join(self.file_name())
    }

    /// Whether the content is expected to be JSON
    pub fn is_json(&self) -> bool {
        matches!(self, Target::Vscode | Target::Docker)
    }

    /// Identifier accepted on the command line
    pub fn key(&self) -> &'static str {
        match self {
            Target::Gitconfig => "gitconfig",
            Target::Zshrc => "zshrc",
            Target::Bashrc => "bashrc",
            Target::Profile => "profile",
            Target::Env => "env",
            Target::Vscode => "vscode",
            Target::Ssh => "ssh",
            Target::Npmrc => "npmrc",
            Target::Yarnrc => "yarnrc",
            Target::Docker => "docker",
            Target::AwsConfig => "aws-config",
            Target::AwsCredentials => "aws-credentials",
        }
    }

    /// Get human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Target::Gitconfig => "Git (.gitconfig)",
            Target::Zshrc => "Zsh (.zshrc)",
            Target::Bashrc => "Bash (.bashrc)",
            Target::Profile => "Login shell (.profile)",
            Target::Env => "Environment (.env)",
            Target::Vscode => "VS Code (settings.json)",
            Target::Ssh => "SSH (~/.ssh/config)",
            Target::Npmrc => "npm (.npmrc)",
            Target::Yarnrc => "Yarn (.yarnrc)",
            Target::Docker => "Docker (~/.docker/config.json)",
            Target::AwsConfig => "AWS config (~/.aws/config)",
            Target::AwsCredentials => "AWS credentials (~/.aws/credentials)",
        }
    }

    /// Reverse lookup from a profile/snapshot file name
    pub fn from_file_name(name: &str) -> Option<Target> {
        Target::all().into_iter().find(|t| t.file_name() == name)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Target {
    type Err = DevswitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        if let Some(target) = Target::from_file_name(&lowered) {
            return Ok(target);
        }
        match lowered.as_str() {
            "gitconfig" | "git" => Ok(Target::Gitconfig),
            "zshrc" | "zsh" => Ok(Target::Zshrc),
            "bashrc" | "bash" => Ok(Target::Bashrc),
            "profile" => Ok(Target::Profile),
            "env" => Ok(Target::Env),
            "vscode" | "code" => Ok(Target::Vscode),
            "ssh" | "ssh-config" => Ok(Target::Ssh),
            "npmrc" | "npm" => Ok(Target::Npmrc),
            "yarnrc" | "yarn" => Ok(Target::Yarnrc),
            "docker" => Ok(Target::Docker),
            "aws-config" => Ok(Target::AwsConfig),
            "aws-credentials" => Ok(Target::AwsCredentials),
            _ => Err(DevswitchError::UnknownTarget(s.to_string())),
        }
    }
}

/// Parse a list of CLI target names, keeping canonical order and dropping duplicates
pub fn parse_targets<S: AsRef<str>>(names: &[S]) -> Result<Vec<Target>, DevswitchError> {
    let mut targets = names
        .iter()
        .map(|n| n.as_ref().parse::<Target>())
        .collect::<Result<Vec<_>, _>>()?;
    targets.sort();
    targets.dedup();
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_paths() {
        let paths = Paths::with_home(PathBuf::from("/home/alice"));

        assert_eq!(
            Target::Gitconfig.live_path(&paths),
            PathBuf::from("/home/alice/.gitconfig")
        );
        assert!(Target::Ssh.live_path(&paths).ends_with(".ssh/config"));
        assert!(
            Target::Vscode
                .live_path(&paths)
                .ends_with("Code/User/settings.json")
        );
        assert!(
            Target::Vscode
                .profile_path(&paths, "work")
                .ends_with("profiles/work/settings.json")
        );
    }

    #[test]
    fn test_target_from_str() {
        assert_eq!("gitconfig".parse::<Target>().unwrap(), Target::Gitconfig);
        assert_eq!(".gitconfig".parse::<Target>().unwrap(), Target::Gitconfig);
        assert_eq!("ZSHRC".parse::<Target>().unwrap(), Target::Zshrc);
        assert_eq!("settings.json".parse::<Target>().unwrap(), Target::Vscode);
        assert_eq!("aws_config".parse::<Target>().unwrap(), Target::AwsConfig);
        assert!("invalid".parse::<Target>().is_err());
    }

    #[test]
    fn test_file_names_unique() {
        let mut names: Vec<_> = Target::all().iter().map(|t| t.file_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Target::all().len());
    }

    #[test]
    fn test_canonical_order_matches_ord() {
        let mut sorted = Target::all();
        sorted.sort();
        assert_eq!(sorted, Target::all());
    }

    #[test]
    fn test_parse_targets_sorts_and_dedups() {
        let targets = parse_targets(&["vscode", "gitconfig", "git"]).unwrap();
        assert_eq!(targets, vec![Target::Gitconfig, Target::Vscode]);
        assert!(parse_targets(&["nope"]).is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Target::AwsCredentials).unwrap();
        assert_eq!(json, "\"aws-credentials\"");
    }
}
