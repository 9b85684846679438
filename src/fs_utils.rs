//! Filesystem utility functions
//!
//! Every write to a live target goes through [`atomic_write`], so a target
//! is always either its old bytes or its new bytes, never a torn mix.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Upper bound on symlink hops followed by [`resolve_symlinks`]
const MAX_SYMLINK_HOPS: usize = 40;

/// Recursively calculate the total size of a directory in bytes
///
/// Symbolic links are not followed.
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            total += metadata.len();
        } else if metadata.is_dir() {
            total += dir_size(&entry.path())?;
        }
    }
    Ok(total)
}

/// Follow a chain of symlinks to the file that actually holds the content
///
/// Works for dangling links too (returns the missing destination), so a
/// dotfile managed by stow or a dotfiles repo gets written in place instead
/// of having its link replaced by a regular file.
pub fn resolve_symlinks(path: &Path) -> PathBuf {
    let mut current = path.to_path_buf();
    for _ in 0..MAX_SYMLINK_HOPS {
        match fs::read_link(&current) {
            Ok(dest) => {
                current = if dest.is_absolute() {
                    dest
                } else {
                    current
                        .parent()
                        .map(|p| p.join(&dest))
                        .unwrap_or(dest)
                };
            }
            Err(_) => break,
        }
    }
    current
}

/// Read a file, treating "not there" (including a non-directory parent) as `None`
pub fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read(path).map(Some)
}

/// Unix permission bits of a file, if it exists
#[cfg(unix)]
pub fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
pub fn file_mode(_path: &Path) -> Option<u32> {
    None
}

#[cfg(unix)]
fn set_mode(file: &fs::File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Replace the contents of `path` atomically
///
/// Writes a sibling temp file, syncs it, applies `mode` if given and renames
/// it over the destination. Missing parent directories are created.
pub fn atomic_write(path: &Path, contents: &[u8], mode: Option<u32>) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let temp_path = parent.join(format!(".{}.devswitch-tmp", file_name));

    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(contents)?;
        if let Some(mode) = mode {
            set_mode(&file, mode)?;
        }
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Remove a file, succeeding if it is already gone
///
/// A path whose parent is not a directory cannot exist either, so
/// `NotADirectory` counts as gone too.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ) =>
        {
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a/b/c.txt");
        atomic_write(&path, b"hello", None).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");

        atomic_write(&path, b"bye", None).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"bye");

        // No temp file left behind
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".devswitch-tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_atomic_write_under_file_fails() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "i am a file").unwrap();
        assert!(atomic_write(&blocker.join("child"), b"x", None).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_mode() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secret");
        atomic_write(&path, b"token", Some(0o600)).unwrap();
        assert_eq!(file_mode(&path), Some(0o600));
    }

    #[test]
    fn test_read_optional() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        assert!(read_optional(&path).unwrap().is_none());
        fs::write(&path, "x").unwrap();
        assert_eq!(read_optional(&path).unwrap().unwrap(), b"x");
        // Parent is a file, not a directory
        assert!(read_optional(&path.join("nested")).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_symlinks() {
        let temp = TempDir::new().unwrap();
        let real = temp.path().join("dotfiles/.gitconfig");
        fs::create_dir_all(real.parent().unwrap()).unwrap();
        fs::write(&real, "[user]").unwrap();
        let link = temp.path().join(".gitconfig");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        assert_eq!(resolve_symlinks(&link), real);
        assert_eq!(resolve_symlinks(&real), real);
    }

    #[test]
    fn test_remove_if_exists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gone");
        remove_if_exists(&path).unwrap();
        fs::write(&path, "x").unwrap();
        remove_if_exists(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_if_exists_under_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join(".aws");
        fs::write(&blocker, "not a directory").unwrap();

        remove_if_exists(&blocker.join("config")).unwrap();
        assert_eq!(fs::read_to_string(&blocker).unwrap(), "not a directory");
    }
}
