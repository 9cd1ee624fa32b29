//! Path normalization for user-supplied paths.
//!
//! The store identifies a file by the exact string of its absolute path, so
//! every path coming from the command line goes through [`absolutize`] first.
//! Normalization is purely lexical: symlinks are never resolved and the file
//! does not have to exist.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Make `path` absolute against the current directory.
///
/// # Example
/// ```ignore
/// // with cwd = /work
/// assert_eq!(absolutize("src/../a.txt")?, PathBuf::from("/work/a.txt"));
/// ```
pub fn absolutize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.is_absolute() {
        return Ok(normalize_lexically(path));
    }
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    Ok(absolutize_from(&cwd, path))
}

/// Make `path` absolute against `base` without touching the filesystem.
pub fn absolutize_from(base: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    normalize_lexically(&base.as_ref().join(path))
}

/// Drop `.` components and fold `..` into its parent.
///
/// `..` at the root stays at the root, as the kernel treats it.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Compute relative path from base to target.
///
/// Returns the relative path from `base` to `target`, or the absolute target
/// if they don't share a common prefix.
pub fn compute_relative_path(base: impl AsRef<Path>, target: impl AsRef<Path>) -> PathBuf {
    let base = base.as_ref();
    let target = target.as_ref();

    match target.strip_prefix(base) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => target.to_path_buf(),
    }
}
