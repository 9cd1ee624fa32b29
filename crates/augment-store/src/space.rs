//! Space discovery and provisioning.
//!
//! A directory is a space root iff it directly contains [`MARKER_DIR`].
//! [`find_space_root`] never creates anything; [`ensure_space`] is the one
//! place the marker and its compartments get created.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::identity::FileIdentity;

/// Marker directory name identifying a space root.
pub const MARKER_DIR: &str = ".augment";

/// Reserved compartment for raw version blobs.
pub const VERSIONS_DIR: &str = "versions";
/// Per-file content shards.
pub const FILE_VERSIONS_DIR: &str = "file_versions";
/// Per-file metadata shards.
pub const FILE_METADATA_DIR: &str = "file_metadata";
/// Reserved compartment for point-in-time snapshots.
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// Every compartment a provisioned space must have.
pub const COMPARTMENTS: [&str; 4] = [
    VERSIONS_DIR,
    FILE_VERSIONS_DIR,
    FILE_METADATA_DIR,
    SNAPSHOTS_DIR,
];

/// Blob file extension inside a content shard.
pub const BLOB_EXT: &str = "data";
/// Record file extension inside a metadata shard.
pub const RECORD_EXT: &str = "json";

/// Provisioning a space failed.
#[derive(Error, Debug)]
#[error("failed to {op} {}: {source}", path.display())]
pub struct InitError {
    pub op: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// A space root and the paths derived from it.
///
/// All shard and file paths are built here so the write path, the read path
/// and inspection cannot disagree on layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    root: PathBuf,
}

impl Space {
    /// Wrap a root directory. Does not touch the filesystem.
    pub fn at<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn marker_dir(&self) -> PathBuf {
        self.root.join(MARKER_DIR)
    }

    pub fn compartment(&self, name: &str) -> PathBuf {
        self.marker_dir().join(name)
    }

    /// `file_versions/<identifier>/`
    pub fn content_shard(&self, identity: &FileIdentity) -> PathBuf {
        self.compartment(FILE_VERSIONS_DIR).join(identity.identifier())
    }

    /// `file_metadata/<identifier>/`
    pub fn metadata_shard(&self, identity: &FileIdentity) -> PathBuf {
        self.compartment(FILE_METADATA_DIR).join(identity.identifier())
    }

    /// `file_versions/<identifier>/<version-id>.data`
    pub fn blob_path(&self, identity: &FileIdentity, version_id: &str) -> PathBuf {
        self.content_shard(identity).join(format!("{}.{}", version_id, BLOB_EXT))
    }

    /// `file_metadata/<identifier>/<version-id>.json`
    pub fn record_path(&self, identity: &FileIdentity, version_id: &str) -> PathBuf {
        self.metadata_shard(identity).join(format!("{}.{}", version_id, RECORD_EXT))
    }

    /// Compartments that do not exist on disk.
    pub fn missing_compartments(&self) -> Vec<&'static str> {
        COMPARTMENTS
            .iter()
            .copied()
            .filter(|name| !self.compartment(name).is_dir())
            .collect()
    }
}

/// Find the nearest ancestor of `file_path` holding a marker directory.
///
/// Starts at the file's containing directory and walks up one parent at a
/// time. Reaching the filesystem root without a hit returns `None`.
pub fn find_space_root<P: AsRef<Path>>(file_path: P) -> Option<PathBuf> {
    let mut current = file_path.as_ref().parent();

    while let Some(dir) = current {
        if dir.join(MARKER_DIR).is_dir() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }

    None
}

/// Create the marker directory and all compartments under `root`.
///
/// Idempotent and safe to race: a directory that already exists counts as
/// created.
#[instrument(level = "debug")]
pub fn ensure_space(root: &Path) -> Result<Space, InitError> {
    let space = Space::at(root);

    let marker = space.marker_dir();
    create_dir(&marker)?;
    for name in COMPARTMENTS {
        create_dir(&space.compartment(name))?;
    }

    debug!(space_root = %root.display(), "space provisioned");
    Ok(space)
}

fn create_dir(path: &Path) -> Result<(), InitError> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(source) => Err(InitError {
            op: "create directory",
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_space_creates_all_compartments() {
        let temp = TempDir::new().unwrap();
        let space = ensure_space(temp.path()).unwrap();

        assert!(space.marker_dir().is_dir());
        for name in COMPARTMENTS {
            assert!(space.compartment(name).is_dir(), "missing {}", name);
        }
        assert!(space.missing_compartments().is_empty());
    }

    #[test]
    fn test_ensure_space_is_idempotent() {
        let temp = TempDir::new().unwrap();
        ensure_space(temp.path()).unwrap();
        let space = ensure_space(temp.path()).unwrap();

        let mut entries: Vec<_> = fs::read_dir(space.marker_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        entries.sort();
        let mut expected: Vec<_> = COMPARTMENTS.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(entries, expected);
    }

    #[test]
    fn test_ensure_space_repairs_partial_marker() {
        // A marker created without compartments (the "constructed directly" case)
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(MARKER_DIR)).unwrap();
        let space = Space::at(temp.path());
        assert_eq!(space.missing_compartments().len(), 4);

        ensure_space(temp.path()).unwrap();
        assert!(space.missing_compartments().is_empty());
    }

    #[test]
    fn test_ensure_space_races() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let root = root.clone();
                std::thread::spawn(move || ensure_space(&root).map(|_| ()))
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }
        assert!(Space::at(&root).missing_compartments().is_empty());
    }

    #[test]
    fn test_ensure_space_fails_under_a_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();

        let err = ensure_space(&blocker).unwrap_err();
        assert_eq!(err.op, "create directory");
    }

    #[test]
    fn test_find_space_root_none() {
        let temp = TempDir::new().unwrap();
        assert_eq!(find_space_root(temp.path().join("a.txt")), None);
    }

    #[test]
    fn test_find_space_root_does_not_create() {
        let temp = TempDir::new().unwrap();
        find_space_root(temp.path().join("a.txt"));
        assert!(!temp.path().join(MARKER_DIR).exists());
    }

    #[test]
    fn test_find_space_root_walks_up() {
        let temp = TempDir::new().unwrap();
        ensure_space(temp.path()).unwrap();
        let deep = temp.path().join("a/b/c");
        fs::create_dir_all(&deep).unwrap();

        assert_eq!(
            find_space_root(deep.join("file.txt")),
            Some(temp.path().to_path_buf())
        );
    }

    #[test]
    fn test_find_space_root_prefers_nearest() {
        let temp = TempDir::new().unwrap();
        let inner = temp.path().join("inner");
        ensure_space(temp.path()).unwrap();
        ensure_space(&inner).unwrap();

        assert_eq!(find_space_root(inner.join("x.txt")), Some(inner.clone()));
        assert_eq!(
            find_space_root(temp.path().join("y.txt")),
            Some(temp.path().to_path_buf())
        );
    }

    #[test]
    fn test_find_space_root_ignores_marker_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(MARKER_DIR), b"not a directory").unwrap();
        assert_eq!(find_space_root(temp.path().join("a.txt")), None);
    }

    #[test]
    fn test_shard_paths_share_identifier() {
        let space = Space::at("/S");
        let id = FileIdentity::new("/S/a.txt").unwrap();

        assert_eq!(
            space.content_shard(&id).file_name(),
            space.metadata_shard(&id).file_name()
        );
        assert_eq!(
            space.blob_path(&id, "v1"),
            PathBuf::from(format!("/S/.augment/file_versions/{}/v1.data", id.identifier()))
        );
        assert_eq!(
            space.record_path(&id, "v1"),
            PathBuf::from(format!("/S/.augment/file_metadata/{}/v1.json", id.identifier()))
        );
    }
}
