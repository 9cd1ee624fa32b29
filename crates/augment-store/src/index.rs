//! Version index: the read path.
//!
//! Listing never checks blobs; [`VersionStore::verify_history`] does.
//! Every way a history can come back empty logs a distinct event, so an empty
//! result is never confused with a failed read.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::identity::FileIdentity;
use crate::record::{content_digest, VersionRecord};
use crate::space::{ensure_space, find_space_root, Space, RECORD_EXT};
use crate::store::VersionStore;
use crate::{io_err, Result, StoreError};

/// A metadata file that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub path: PathBuf,
    pub reason: String,
}

/// History lookup with the diagnostics that produced it.
#[derive(Debug, Clone)]
pub struct HistoryReport {
    pub identity: FileIdentity,
    /// Governing space, if any (including one provisioned by this lookup)
    pub space_root: Option<PathBuf>,
    /// No space existed; this lookup created one in the file's directory
    pub lazily_provisioned: bool,
    /// The file's metadata shard exists
    pub shard_present: bool,
    /// Newest first
    pub records: Vec<VersionRecord>,
    pub skipped: Vec<SkippedRecord>,
}

impl HistoryReport {
    fn empty(identity: FileIdentity) -> Self {
        Self {
            identity,
            space_root: None,
            lazily_provisioned: false,
            shard_present: false,
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// An integrity problem with one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFault {
    /// The record's blob does not exist
    MissingBlob(VersionRecord),
    /// The blob exists but its digest differs from `contentHash`
    HashMismatch { record: VersionRecord, actual: String },
}

impl IntegrityFault {
    pub fn record(&self) -> &VersionRecord {
        match self {
            IntegrityFault::MissingBlob(record) => record,
            IntegrityFault::HashMismatch { record, .. } => record,
        }
    }
}

/// Records split by whether their blob checks out.
#[derive(Debug, Clone, Default)]
pub struct VerifiedHistory {
    /// Newest first
    pub intact: Vec<VersionRecord>,
    pub faults: Vec<IntegrityFault>,
}

impl VersionStore {
    /// Load the history of `file_path` along with how it was found.
    ///
    /// A missing space or shard yields an empty history, not an error. When
    /// `lazy_init` is on and no space governs the file, one is provisioned in
    /// the file's directory (if that directory exists).
    #[instrument(
        skip(self, file_path),
        fields(file = %file_path.as_ref().display()),
        level = "debug"
    )]
    pub fn lookup_history<P: AsRef<Path>>(&self, file_path: P) -> Result<HistoryReport> {
        let identity = FileIdentity::new(file_path.as_ref())?;
        let mut report = HistoryReport::empty(identity.clone());

        let Some(root) = find_space_root(identity.path()) else {
            self.provision_for_read(&mut report);
            return Ok(report);
        };

        let space = Space::at(&root);
        if self.options().lazy_init {
            let missing = space.missing_compartments();
            if !missing.is_empty() {
                warn!(
                    space_root = %root.display(),
                    missing = ?missing,
                    "space is missing compartments, repairing"
                );
                // Best effort: a blocked compartment must not hide records
                // that are still readable.
                if let Err(e) = ensure_space(&root) {
                    warn!(space_root = %root.display(), error = %e, "compartment repair failed");
                }
            }
        }
        report.space_root = Some(root);

        let shard = space.metadata_shard(&identity);
        if !shard.is_dir() {
            debug!(
                identifier = identity.identifier(),
                shard = %shard.display(),
                "no metadata shard, history is empty"
            );
            return Ok(report);
        }
        report.shard_present = true;

        let (records, skipped) = load_shard(&shard, &identity)?;
        report.records = records;
        report.skipped = skipped;

        info!(
            identifier = identity.identifier(),
            count = report.records.len(),
            skipped = report.skipped.len(),
            "history loaded"
        );
        Ok(report)
    }

    /// Versions of `file_path`, newest first.
    pub fn list_versions<P: AsRef<Path>>(&self, file_path: P) -> Result<Vec<VersionRecord>> {
        Ok(self.lookup_history(file_path)?.records)
    }

    /// History split into records whose blob is present and matches, and
    /// integrity faults.
    pub fn verify_history<P: AsRef<Path>>(&self, file_path: P) -> Result<VerifiedHistory> {
        verify_records(self.list_versions(file_path)?, true)
    }

    fn provision_for_read(&self, report: &mut HistoryReport) {
        let parent = report.identity.parent().to_path_buf();
        if !self.options().lazy_init {
            debug!(file = report.identity.path_str(), "no space governs file, history is empty");
            return;
        }
        if !parent.is_dir() {
            debug!(
                file = report.identity.path_str(),
                "no space governs file and its directory does not exist, history is empty"
            );
            return;
        }

        match ensure_space(&parent) {
            Ok(_) => {
                info!(
                    file = report.identity.path_str(),
                    space_root = %parent.display(),
                    "no space governed file, provisioned one; history is empty"
                );
                report.space_root = Some(parent);
                report.lazily_provisioned = true;
            }
            Err(e) => {
                warn!(
                    file = report.identity.path_str(),
                    error = %e,
                    "no space governs file and provisioning failed; history is empty"
                );
            }
        }
    }
}

/// Parse every record in a metadata shard. One bad file never fails the
/// whole listing.
fn load_shard(
    shard: &Path,
    identity: &FileIdentity,
) -> Result<(Vec<VersionRecord>, Vec<SkippedRecord>)> {
    let mut records = Vec::new();
    let mut skipped = Vec::new();

    for entry in fs::read_dir(shard).map_err(io_err("list metadata shard", shard))? {
        let entry = entry.map_err(io_err("list metadata shard", shard))?;
        let path = entry.path();

        // Temp files from in-flight writes start with a dot.
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
            continue;
        }

        let parsed = fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| VersionRecord::parse(&bytes, &path, identity));
        match parsed {
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!(record = %path.display(), %reason, "skipping malformed version record");
                skipped.push(SkippedRecord { path, reason });
            }
        }
    }

    records.sort_by(VersionRecord::history_cmp);
    Ok((records, skipped))
}

/// Check each record's blob. With `check_hashes` off only existence is
/// checked, which avoids reading every blob.
pub fn verify_records(records: Vec<VersionRecord>, check_hashes: bool) -> Result<VerifiedHistory> {
    let mut verified = VerifiedHistory::default();

    for record in records {
        if !record.storage_path.is_file() {
            warn!(version_id = %record.id, blob = %record.storage_path.display(), "missing blob");
            verified.faults.push(IntegrityFault::MissingBlob(record));
            continue;
        }
        if check_hashes {
            let data =
                fs::read(&record.storage_path).map_err(io_err("read blob", &record.storage_path))?;
            let actual = content_digest(&data);
            if actual != record.content_hash {
                warn!(version_id = %record.id, "blob content does not match record hash");
                verified
                    .faults
                    .push(IntegrityFault::HashMismatch { record, actual });
                continue;
            }
        }
        verified.intact.push(record);
    }

    Ok(verified)
}

impl From<IntegrityFault> for StoreError {
    fn from(fault: IntegrityFault) -> Self {
        match fault {
            IntegrityFault::MissingBlob(record) => StoreError::MissingBlob {
                id: record.id,
                path: record.storage_path,
            },
            IntegrityFault::HashMismatch { record, actual } => StoreError::HashMismatch {
                id: record.id,
                expected: record.content_hash,
                actual,
            },
        }
    }
}
