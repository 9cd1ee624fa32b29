//! Path hashing.
//!
//! [`identifier`] is the only function in the workspace that turns a file path
//! into a shard name. Write, read and inspection paths all go through it.
//!
//! # Breaking-change risk
//!
//! [`IDENTIFIER_LEN`] and the digest algorithm are part of the on-disk format.
//! Changing either orphans every shard already written; it needs a migration
//! that renames existing shard directories.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Result, StoreError};

/// Number of hex characters kept from the path digest.
pub const IDENTIFIER_LEN: usize = 16;

/// Derive the shard identifier for an absolute path string.
///
/// BLAKE3 over the exact UTF-8 bytes of `path`, hex encoded, truncated to
/// [`IDENTIFIER_LEN`]. No normalization happens here: `/a/b.txt` and
/// `/a/./b.txt` are different files as far as the store is concerned.
#[inline]
pub fn identifier(path: &str) -> String {
    let hex = blake3::hash(path.as_bytes()).to_hex();
    hex.as_str()[..IDENTIFIER_LEN].to_string()
}

/// An absolute file path paired with its derived identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    path: PathBuf,
    path_str: String,
    identifier: String,
}

impl FileIdentity {
    /// Build the identity for `path`.
    ///
    /// The path must be absolute, valid UTF-8 (it is stored as a JSON string),
    /// and name a file inside some directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(StoreError::InvalidPath(format!(
                "path must be absolute: {}",
                path.display()
            )));
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| {
                StoreError::InvalidPath(format!("path is not valid UTF-8: {}", path.display()))
            })?
            .to_string();
        if path.file_name().is_none() || path.parent().is_none() {
            return Err(StoreError::InvalidPath(format!(
                "path does not name a file: {}",
                path.display()
            )));
        }

        Ok(Self {
            identifier: identifier(&path_str),
            path: path.to_path_buf(),
            path_str,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The path string exactly as it is hashed and recorded.
    pub fn path_str(&self) -> &str {
        &self.path_str
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Directory containing the file; where the space lookup starts.
    pub fn parent(&self) -> &Path {
        // `new` rejects paths without a parent.
        self.path.parent().unwrap_or(Path::new("/"))
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path_str, self.identifier)
    }
}
