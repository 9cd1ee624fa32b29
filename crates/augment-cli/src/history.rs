//! `augment log` rendering and version-id resolution.

use std::path::Path;

use anyhow::{bail, Result};
use augment_store::{IntegrityFault, StoreError, VersionRecord, VersionStore};
use console::style;
use serde_json::json;

/// Resolve `wanted` to one of `file`'s versions: an exact id, or a prefix
/// matching exactly one id.
pub fn resolve_version(store: &VersionStore, file: &Path, wanted: &str) -> Result<VersionRecord> {
    match store.get_version(file, wanted) {
        Ok(record) => return Ok(record),
        Err(StoreError::VersionNotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    let mut matches: Vec<VersionRecord> = store
        .list_versions(file)?
        .into_iter()
        .filter(|r| r.id.starts_with(wanted))
        .collect();
    match matches.len() {
        0 => bail!("no version matching '{}' for {}", wanted, file.display()),
        1 => Ok(matches.remove(0)),
        n => bail!(
            "version prefix '{}' is ambiguous ({} versions match)",
            wanted,
            n
        ),
    }
}

pub fn format_timestamp(record: &VersionRecord) -> String {
    record
        .timestamp
        .format("%Y-%m-%d %H:%M:%S%.3f UTC")
        .to_string()
}

pub fn cmd_log(store: &VersionStore, file: &Path, verify: bool, as_json: bool) -> Result<()> {
    if !verify {
        let report = store.lookup_history(file)?;
        if as_json {
            println!("{}", serde_json::to_string_pretty(&report.records)?);
            return Ok(());
        }
        if report.records.is_empty() {
            match &report.space_root {
                None => eprintln!("No augment space governs {}", file.display()),
                Some(_) => eprintln!("No versions of {}", file.display()),
            }
        }
        for record in &report.records {
            print_record(record);
        }
        for skipped in &report.skipped {
            eprintln!(
                "{} skipped {}: {}",
                style("warning:").yellow(),
                skipped.path.display(),
                skipped.reason
            );
        }
        return Ok(());
    }

    let verified = store.verify_history(file)?;
    if as_json {
        let faults: Vec<_> = verified
            .faults
            .iter()
            .map(|fault| {
                json!({
                    "id": fault.record().id,
                    "fault": fault_kind(fault),
                    "storagePath": fault.record().storage_path,
                })
            })
            .collect();
        let out = json!({ "intact": verified.intact, "faults": faults });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for record in &verified.intact {
        print_record(record);
    }
    for fault in &verified.faults {
        eprintln!(
            "{} {} {}",
            style("damaged:").red(),
            style(&fault.record().id).yellow(),
            fault_kind(fault)
        );
    }
    if !verified.faults.is_empty() {
        bail!(
            "{} of {} versions failed verification",
            verified.faults.len(),
            verified.faults.len() + verified.intact.len()
        );
    }
    Ok(())
}

fn fault_kind(fault: &IntegrityFault) -> &'static str {
    match fault {
        IntegrityFault::MissingBlob(_) => "missing blob",
        IntegrityFault::HashMismatch { .. } => "hash mismatch",
    }
}

fn print_record(record: &VersionRecord) {
    let comment = record.comment.as_deref().unwrap_or("");
    println!(
        "{}  {}  {:>8}  {}",
        style(&record.id).yellow(),
        format_timestamp(record),
        format_bytes(record.size),
        comment
    );
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}K", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1}M", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}G", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use augment_store::ensure_space;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_exact_and_prefix() {
        let temp = TempDir::new().unwrap();
        ensure_space(temp.path()).unwrap();
        let store = VersionStore::new();
        let file = temp.path().join("a.txt");
        let v1 = store.create_version(&file, b"v1", None).unwrap();

        assert_eq!(resolve_version(&store, &file, &v1.id).unwrap(), v1);
        assert_eq!(resolve_version(&store, &file, &v1.id[..13]).unwrap(), v1);
        assert!(resolve_version(&store, &file, "zzzz").is_err());
    }

    #[test]
    fn test_resolve_ambiguous_prefix() {
        let temp = TempDir::new().unwrap();
        ensure_space(temp.path()).unwrap();
        let store = VersionStore::new();
        let file = temp.path().join("a.txt");
        store.create_version(&file, b"v1", None).unwrap();
        store.create_version(&file, b"v2", None).unwrap();

        // The empty prefix matches every id
        let err = resolve_version(&store, &file, "").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(2), "2B");
        assert_eq!(format_bytes(2048), "2.0K");
    }
}
