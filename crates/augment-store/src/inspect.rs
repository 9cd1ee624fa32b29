//! Read-only inspection of spaces and files.
//!
//! Nothing here creates directories, even when the store would. The reports
//! are what `augment doctor` renders.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::identity::{FileIdentity, IDENTIFIER_LEN};
use crate::index::{verify_records, IntegrityFault, SkippedRecord};
use crate::space::{find_space_root, Space, BLOB_EXT, FILE_METADATA_DIR, FILE_VERSIONS_DIR};
use crate::store::{StoreOptions, VersionStore};
use crate::{io_err, Result};

/// Layout health of one space.
#[derive(Debug, Clone, Default)]
pub struct SpaceReport {
    pub root: PathBuf,
    pub marker_present: bool,
    pub missing_compartments: Vec<&'static str>,
    pub metadata_shards: usize,
    pub content_shards: usize,
    /// Shards with records but no content directory
    pub metadata_only: Vec<String>,
    /// Shards with blobs but no metadata directory
    pub content_only: Vec<String>,
    /// Shard directories whose name is not a current-format identifier
    pub foreign_shards: Vec<String>,
}

impl SpaceReport {
    /// Metadata and content namespaces disagree on which files exist.
    pub fn is_diverged(&self) -> bool {
        !self.metadata_only.is_empty() || !self.content_only.is_empty()
    }
}

/// Everything the store knows about one file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub identity: FileIdentity,
    pub space_root: Option<PathBuf>,
    pub metadata_shard: Option<PathBuf>,
    pub content_shard: Option<PathBuf>,
    pub metadata_shard_present: bool,
    pub content_shard_present: bool,
    pub records: usize,
    pub skipped: Vec<SkippedRecord>,
    pub faults: Vec<IntegrityFault>,
    /// Blobs no record points at
    pub orphan_blobs: Vec<PathBuf>,
}

/// Inspect the layout of the space rooted at `root`.
pub fn inspect_space<P: AsRef<Path>>(root: P) -> Result<SpaceReport> {
    let space = Space::at(root.as_ref());
    let mut report = SpaceReport {
        root: space.root().to_path_buf(),
        marker_present: space.marker_dir().is_dir(),
        ..SpaceReport::default()
    };
    if !report.marker_present {
        return Ok(report);
    }
    report.missing_compartments = space.missing_compartments();

    let metadata = shard_names(&space.compartment(FILE_METADATA_DIR))?;
    let content = shard_names(&space.compartment(FILE_VERSIONS_DIR))?;
    report.metadata_shards = metadata.len();
    report.content_shards = content.len();

    report.metadata_only = metadata.difference(&content).cloned().collect();
    report.content_only = content.difference(&metadata).cloned().collect();
    report.foreign_shards = metadata
        .union(&content)
        .filter(|name| !is_identifier(name))
        .cloned()
        .collect();

    Ok(report)
}

/// Inspect one file's shards, records and blobs.
///
/// `verify_hashes` re-digests every blob; without it only blob existence is
/// checked.
pub fn inspect_file<P: AsRef<Path>>(file_path: P, verify_hashes: bool) -> Result<FileReport> {
    let store = VersionStore::with_options(StoreOptions {
        lazy_init: false,
        ..StoreOptions::default()
    });
    let history = store.lookup_history(file_path)?;
    let identity = history.identity;

    let mut report = FileReport {
        identity: identity.clone(),
        space_root: history.space_root,
        metadata_shard: None,
        content_shard: None,
        metadata_shard_present: history.shard_present,
        content_shard_present: false,
        records: history.records.len(),
        skipped: history.skipped,
        faults: Vec::new(),
        orphan_blobs: Vec::new(),
    };
    let Some(root) = find_space_root(identity.path()) else {
        return Ok(report);
    };

    let space = Space::at(root);
    let content_shard = space.content_shard(&identity);
    report.metadata_shard = Some(space.metadata_shard(&identity));
    report.content_shard_present = content_shard.is_dir();

    let referenced: BTreeSet<PathBuf> = history
        .records
        .iter()
        .map(|r| r.storage_path.clone())
        .collect();
    if report.content_shard_present {
        let entries =
            fs::read_dir(&content_shard).map_err(io_err("list content shard", &content_shard))?;
        for entry in entries {
            let path = entry.map_err(io_err("list content shard", &content_shard))?.path();
            let is_blob = path.extension().and_then(|e| e.to_str()) == Some(BLOB_EXT);
            if is_blob && !referenced.contains(&path) {
                report.orphan_blobs.push(path);
            }
        }
        report.orphan_blobs.sort();
    }
    report.content_shard = Some(content_shard);

    report.faults = verify_records(history.records, verify_hashes)?.faults;
    Ok(report)
}

fn shard_names(compartment: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    if !compartment.is_dir() {
        return Ok(names);
    }
    for entry in fs::read_dir(compartment).map_err(io_err("list compartment", compartment))? {
        let entry = entry.map_err(io_err("list compartment", compartment))?;
        if entry.path().is_dir() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

fn is_identifier(name: &str) -> bool {
    name.len() == IDENTIFIER_LEN && name.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}
