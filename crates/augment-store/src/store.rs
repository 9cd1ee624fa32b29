//! Version store: the write path plus single-version reads.
//!
//! Write ordering for one version:
//! 1. blob → `file_versions/<identifier>/<id>.data` (temp + fsync + rename)
//! 2. record → `file_metadata/<identifier>/<id>.json` (temp + fsync + rename)
//!
//! The record is never attempted if the blob write failed. A blob left behind
//! by a failed record write is unreferenced and harmless.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::identity::FileIdentity;
use crate::locks::{lock_shard, LockTable};
use crate::record::{content_digest, VersionRecord};
use crate::space::{ensure_space, find_space_root, InitError, Space};
use crate::{io_err, Result, StoreError};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Behavior switches for a [`VersionStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Provision a space in the file's directory when a history read finds
    /// none, and repair missing compartments on read.
    pub lazy_init: bool,
    /// fsync blobs and records before renaming them into place.
    pub sync_writes: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lazy_init: true,
            sync_writes: true,
        }
    }
}

/// Entry point for writing and reading file versions.
///
/// Cheap to share behind an `Arc`; writes to the same file are serialized
/// through a per-identifier lock, writes to different files run in parallel.
#[derive(Debug, Default)]
pub struct VersionStore {
    options: StoreOptions,
    locks: LockTable,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            options,
            locks: LockTable::default(),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// See [`crate::space::find_space_root`].
    pub fn find_space_root<P: AsRef<Path>>(&self, file_path: P) -> Option<PathBuf> {
        find_space_root(file_path)
    }

    /// See [`crate::space::ensure_space`].
    pub fn ensure_space<P: AsRef<Path>>(&self, root: P) -> std::result::Result<Space, InitError> {
        ensure_space(root.as_ref())
    }

    /// Locate the governing space, provisioning one in the file's directory
    /// if none exists, and repair a space whose compartments are missing.
    pub(crate) fn resolve_or_init(&self, identity: &FileIdentity) -> Result<Space> {
        if let Some(root) = find_space_root(identity.path()) {
            let space = Space::at(&root);
            let missing = space.missing_compartments();
            if !missing.is_empty() {
                warn!(
                    space_root = %root.display(),
                    missing = ?missing,
                    "space is missing compartments, repairing"
                );
                ensure_space(&root)?;
            }
            return Ok(space);
        }

        let parent = identity.parent();
        if !parent.is_dir() {
            return Err(StoreError::NoSpace(InitError {
                op: "find parent directory",
                path: parent.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "directory does not exist"),
            }));
        }
        info!(space_root = %parent.display(), "no space governs file, provisioning one");
        Ok(ensure_space(parent)?)
    }

    /// Store `content` as a new version of `file_path`.
    #[instrument(skip_all, fields(size = content.len()), level = "debug")]
    pub fn create_version<P: AsRef<Path>>(
        &self,
        file_path: P,
        content: &[u8],
        comment: Option<&str>,
    ) -> Result<VersionRecord> {
        let identity = FileIdentity::new(file_path)?;
        let space = self.resolve_or_init(&identity)?;

        let handle = self.locks.handle(identity.identifier());
        let mut shard = lock_shard(&handle);

        let timestamp = shard.next_timestamp(Utc::now());
        let id = Uuid::now_v7().to_string();
        let content_hash = content_digest(content);

        let blob_path = space.blob_path(&identity, &id);
        write_atomic(&blob_path, content, self.options.sync_writes)?;

        let record = VersionRecord {
            id,
            file_path: identity.path_str().to_string(),
            timestamp,
            size: content.len() as u64,
            comment: comment.map(str::to_string),
            content_hash,
            storage_path: blob_path,
        };

        let record_path = space.record_path(&identity, &record.id);
        let json = serde_json::to_vec_pretty(&record)?;
        if let Err(e) = write_atomic(&record_path, &json, self.options.sync_writes) {
            warn!(
                identifier = identity.identifier(),
                version_id = %record.id,
                blob = %record.storage_path.display(),
                "record write failed, blob left unreferenced"
            );
            return Err(e);
        }

        debug!(
            identifier = identity.identifier(),
            version_id = %record.id,
            space_root = %space.root().display(),
            "version created"
        );
        Ok(record)
    }

    /// Read `file_path` from disk and store it as a new version.
    pub fn snapshot_file<P: AsRef<Path>>(
        &self,
        file_path: P,
        comment: Option<&str>,
    ) -> Result<VersionRecord> {
        let path = file_path.as_ref();
        let content = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::InvalidPath(format!(
                    "file does not exist: {}",
                    path.display()
                )))
            }
            Err(e) => return Err(io_err("read file", path)(e)),
        };
        self.create_version(path, &content, comment)
    }

    /// Load one record by version id. Never provisions anything.
    pub fn get_version<P: AsRef<Path>>(
        &self,
        file_path: P,
        version_id: &str,
    ) -> Result<VersionRecord> {
        let not_found = || StoreError::VersionNotFound {
            id: version_id.to_string(),
        };
        if version_id.is_empty()
            || !version_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(not_found());
        }

        let identity = FileIdentity::new(file_path)?;
        let root = find_space_root(identity.path()).ok_or_else(not_found)?;
        let record_path = Space::at(root).record_path(&identity, version_id);

        let bytes = match fs::read(&record_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(io_err("read record", &record_path)(e)),
        };
        VersionRecord::parse(&bytes, &record_path, &identity).map_err(|reason| {
            StoreError::MalformedRecord {
                path: record_path,
                reason,
            }
        })
    }

    /// Read a version's bytes, checking them against `contentHash`.
    pub fn read_content(&self, record: &VersionRecord) -> Result<Vec<u8>> {
        let data = match fs::read(&record.storage_path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::MissingBlob {
                    id: record.id.clone(),
                    path: record.storage_path.clone(),
                })
            }
            Err(e) => return Err(io_err("read blob", &record.storage_path)(e)),
        };

        let actual = content_digest(&data);
        if actual != record.content_hash {
            return Err(StoreError::HashMismatch {
                id: record.id.clone(),
                expected: record.content_hash.clone(),
                actual,
            });
        }
        Ok(data)
    }

    /// Replace `file_path` with the content of `version_id`.
    ///
    /// The version's blob is verified first. If the file currently exists its
    /// content is stored as a pre-restore backup version, which is returned.
    #[instrument(skip(self), level = "debug")]
    pub fn restore_version(
        &self,
        file_path: &Path,
        version_id: &str,
        comment: Option<&str>,
    ) -> Result<Option<VersionRecord>> {
        let target = self.get_version(file_path, version_id)?;
        let content = self.read_content(&target)?;

        let backup = if file_path.exists() {
            let reason = match comment {
                Some(c) => c.to_string(),
                None => format!(
                    "restored to version from {}",
                    target.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                ),
            };
            let backup_comment = format!("Pre-restore backup: {}", reason);
            Some(self.snapshot_file(file_path, Some(&backup_comment))?)
        } else {
            None
        };

        write_atomic(file_path, &content, self.options.sync_writes)?;
        info!(
            file = %file_path.display(),
            version_id = %target.id,
            "file restored"
        );
        Ok(backup)
    }
}

/// Write `data` to `path` via a sibling temp file and a rename.
///
/// Creates the parent directory if needed (idempotent, race-safe). Keeps the
/// permissions of a file being replaced.
pub(crate) fn write_atomic(path: &Path, data: &[u8], sync: bool) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        StoreError::InvalidPath(format!("no parent directory: {}", path.display()))
    })?;
    fs::create_dir_all(parent).map_err(io_err("create directory", parent))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| StoreError::InvalidPath(format!("no file name: {}", path.display())))?;
    // Unique per call: concurrent writers of one path never share a temp file.
    let temp_path = parent.join(format!(
        ".{}.{}.{}.tmp",
        file_name.to_string_lossy(),
        std::process::id(),
        TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    if let Err(e) = write_and_rename(&temp_path, path, data, sync) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    if sync {
        sync_dir(parent);
    }
    Ok(())
}

fn write_and_rename(temp_path: &Path, path: &Path, data: &[u8], sync: bool) -> Result<()> {
    let mut file = File::create(temp_path).map_err(io_err("create temp file", temp_path))?;
    file.write_all(data).map_err(io_err("write", temp_path))?;
    if sync {
        file.sync_all().map_err(io_err("sync", temp_path))?;
    }
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(temp_path, meta.permissions())
            .map_err(io_err("set permissions", temp_path))?;
    }
    fs::rename(temp_path, path).map_err(io_err("rename", path))
}

/// Persist a rename by syncing the directory entry. Not supported everywhere,
/// so failures are ignored.
fn sync_dir(dir: &Path) {
    if cfg!(unix) {
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }
    }
}
