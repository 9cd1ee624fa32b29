//! Version record format.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::FileIdentity;

/// One immutable snapshot of one file.
///
/// Serialized as the `<version-id>.json` file in the file's metadata shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    /// Unique version id (UUIDv7 for records written by this crate)
    pub id: String,
    /// Absolute path of the versioned file, exactly as hashed
    pub file_path: String,
    /// Creation time, UTC
    pub timestamp: DateTime<Utc>,
    /// Content length in bytes
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// BLAKE3 hex digest of the content
    pub content_hash: String,
    /// Absolute path of the `.data` blob
    pub storage_path: PathBuf,
}

impl VersionRecord {
    /// Parse a record and check it belongs to `identity` and to the file
    /// it was read from.
    pub(crate) fn parse(
        bytes: &[u8],
        record_file: &Path,
        identity: &FileIdentity,
    ) -> Result<Self, String> {
        let record: VersionRecord = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;

        if record.file_path != identity.path_str() {
            return Err(format!(
                "record belongs to {}, not {}",
                record.file_path,
                identity.path_str()
            ));
        }
        let stem = record_file.file_stem().and_then(|s| s.to_str());
        if stem != Some(record.id.as_str()) {
            return Err(format!(
                "record id {} does not match file name {}",
                record.id,
                record_file.display()
            ));
        }

        Ok(record)
    }

    /// History order: newest first, ties broken by id, larger first.
    pub fn history_cmp(&self, other: &Self) -> Ordering {
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// BLAKE3 hex digest used for `contentHash`.
pub fn content_digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}
