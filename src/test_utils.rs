//! Test utilities shared across test modules

use std::fs;

use crate::paths::Paths;
use crate::profiles::ProfileMetadata;
use crate::targets::Target;
use tempfile::TempDir;

/// Create a Paths struct rooted in a temporary home directory
///
/// Both the devswitch state (~/.devswitch) and the live targets (~/.gitconfig,
/// ~/.config/Code/...) land inside the temp dir.
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    Paths::with_home(temp_dir.path().join("home"))
}

/// Write a profile directly into the store
pub fn write_profile(paths: &Paths, name: &str, files: &[(Target, &str)]) {
    let dir = paths.profile_dir(name);
    fs::create_dir_all(&dir).unwrap();
    for (target, content) in files {
        fs::write(dir.join(target.file_name()), content).unwrap();
    }
    ProfileMetadata::new(name.to_string(), None, None)
        .write(&dir)
        .unwrap();
}

/// Write a live target file, creating parents
pub fn write_live(paths: &Paths, target: Target, content: &str) {
    let path = target.live_path(paths);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Read a live target file, `None` when absent
pub fn read_live(paths: &Paths, target: Target) -> Option<String> {
    fs::read_to_string(target.live_path(paths)).ok()
}
