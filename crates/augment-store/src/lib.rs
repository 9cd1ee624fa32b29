//! # augment-store
//!
//! Per-file version store for augment spaces.
//!
//! A space is any directory holding a `.augment/` marker directory. Every file
//! below it (down to the next nested space) gets its own shard, addressed by a
//! truncated BLAKE3 digest of the file's absolute path.
//!
//! ## Directory Layout
//!
//! ```text
//! <space-root>/.augment/
//! ├── versions/                          # reserved
//! ├── file_versions/<identifier>/<version-id>.data
//! ├── file_metadata/<identifier>/<version-id>.json
//! └── snapshots/                         # reserved
//! ```
//!
//! The blob is always durable before its record becomes visible, so a reader
//! that sees a record can always find the bytes it points at.

pub mod identity;
pub mod index;
pub mod inspect;
mod locks;
pub mod record;
pub mod space;
pub mod store;

pub use identity::{identifier, FileIdentity, IDENTIFIER_LEN};
pub use index::{verify_records, HistoryReport, IntegrityFault, SkippedRecord, VerifiedHistory};
pub use inspect::{inspect_file, inspect_space, FileReport, SpaceReport};
pub use record::VersionRecord;
pub use space::{ensure_space, find_space_root, InitError, Space, MARKER_DIR};
pub use store::{StoreOptions, VersionStore};

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur during version store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Resolution found no space and provisioning one failed.
    #[error("no space available: {0}")]
    NoSpace(#[from] InitError),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("malformed version record {}: {reason}", path.display())]
    MalformedRecord { path: PathBuf, reason: String },

    #[error("version {id} has no blob at {}", path.display())]
    MissingBlob { id: String, path: PathBuf },

    #[error("version {id} content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("version not found: {id}")]
    VersionNotFound { id: String },

    #[error("I/O error during {op} on {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("record encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Wrap an `io::Error` with the operation and path that produced it.
pub(crate) fn io_err(op: &'static str, path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { op, path, source }
}
