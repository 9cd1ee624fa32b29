//! # augment doctor
//!
//! Diagnostic checks for a space and, when given a file, its history.
//! Validates config loading, space layout, shard agreement between the
//! metadata and content namespaces, record parsing and blob integrity.

use anyhow::Result;
use console::{style, Emoji};
use std::path::{Path, PathBuf};

use augment_config::{log_doctor_debug, log_doctor_warn, Config};
use augment_store::{find_space_root, inspect_file, inspect_space, IntegrityFault, MARKER_DIR};

static CHECK: Emoji<'_, '_> = Emoji("✔ ", "[ok] ");
static CROSS: Emoji<'_, '_> = Emoji("✘ ", "[!!] ");
static WARN_ICON: Emoji<'_, '_> = Emoji("⚠ ", "[??] ");
static DOT: Emoji<'_, '_> = Emoji("● ", "[-] ");

struct DiagResult {
    passed: u32,
    warned: u32,
    failed: u32,
}

impl DiagResult {
    fn new() -> Self {
        Self {
            passed: 0,
            warned: 0,
            failed: 0,
        }
    }

    fn pass(&mut self, msg: &str) {
        self.passed += 1;
        eprintln!("  {} {}", CHECK, style(msg).green());
    }

    fn warn(&mut self, msg: &str) {
        self.warned += 1;
        eprintln!("  {} {}", WARN_ICON, style(msg).yellow());
    }

    fn fail(&mut self, msg: &str) {
        self.failed += 1;
        eprintln!("  {} {}", CROSS, style(msg).red());
    }

    fn info(&self, msg: &str) {
        eprintln!("  {} {}", DOT, style(msg).dim());
    }
}

/// `path` is a directory (space check only) or a file (space and history).
pub fn cmd_doctor(path: &Path, verify_hashes: bool) -> Result<()> {
    eprintln!();
    eprintln!("{}", style("augment doctor").bold().cyan());
    eprintln!("{}", style("─".repeat(40)).dim());

    let mut d = DiagResult::new();

    eprintln!();
    eprintln!("{}", style("Config").bold());
    check_config(&mut d);

    let is_dir = path.is_dir();
    let root = governing_root(path, is_dir);

    eprintln!();
    eprintln!("{}", style("Space").bold());
    match &root {
        Some(root) => check_space(root, &mut d)?,
        None => {
            d.fail(&format!("No space governs {}", path.display()));
            d.info("Run 'augment init' in the project directory");
        }
    }

    if !is_dir {
        eprintln!();
        eprintln!("{}", style("File").bold());
        check_file(path, verify_hashes, &mut d)?;
    }

    eprintln!();
    eprintln!("{}", style("─".repeat(40)).dim());
    eprintln!(
        "  {} passed, {} warnings, {} errors",
        style(d.passed).green().bold(),
        style(d.warned).yellow().bold(),
        style(d.failed).red().bold(),
    );

    if d.failed > 0 {
        eprintln!();
        std::process::exit(1);
    } else if d.warned > 0 {
        eprintln!(
            "{}",
            style("Some warnings detected. History is still readable.").dim()
        );
    } else {
        eprintln!("{}", style("All checks passed.").dim());
    }

    eprintln!();
    Ok(())
}

/// A directory governs itself if it holds the marker; otherwise look upward.
fn governing_root(path: &Path, is_dir: bool) -> Option<PathBuf> {
    if is_dir && path.join(MARKER_DIR).is_dir() {
        return Some(path.to_path_buf());
    }
    find_space_root(path)
}

fn check_config(d: &mut DiagResult) {
    match Config::global_config_path() {
        Some(path) if path.exists() => d.pass(&format!("Global config: {}", path.display())),
        Some(path) => d.info(&format!("No global config at {}", path.display())),
        None => d.warn("Cannot determine config directory"),
    }

    match Config::load() {
        Ok(cfg) => {
            d.pass("Config loads successfully");
            if !cfg.store.sync_writes {
                d.warn("store.sync_writes is off; versions may not survive a crash");
            }
        }
        Err(e) => d.fail(&format!("Config load failed: {}", e)),
    }
}

fn check_space(root: &Path, d: &mut DiagResult) -> Result<()> {
    log_doctor_debug!("inspecting space", root = &*root.to_string_lossy());
    let report = inspect_space(root)?;

    d.pass(&format!("{}/ at {}", MARKER_DIR, root.display()));
    if report.missing_compartments.is_empty() {
        d.pass("All compartments present");
    } else {
        d.warn(&format!(
            "Missing compartments: {}",
            report.missing_compartments.join(", ")
        ));
        d.info("Run 'augment init' to repair, or write a version to repair on demand");
    }

    d.info(&format!(
        "{} metadata shards, {} content shards",
        report.metadata_shards, report.content_shards
    ));
    if !report.metadata_only.is_empty() {
        log_doctor_warn!("metadata shards without content", count = report.metadata_only.len());
        d.warn(&format!(
            "{} shard(s) have records but no content directory",
            report.metadata_only.len()
        ));
    }
    if !report.content_only.is_empty() {
        log_doctor_warn!("content shards without metadata", count = report.content_only.len());
        d.warn(&format!(
            "{} shard(s) have blobs but no records",
            report.content_only.len()
        ));
    }
    if !report.foreign_shards.is_empty() {
        d.warn(&format!(
            "{} shard name(s) are not current identifiers: {}",
            report.foreign_shards.len(),
            report.foreign_shards.join(", ")
        ));
        d.info("These were written with a different path hash and are not reachable");
    }
    if !report.is_diverged() && report.foreign_shards.is_empty() {
        d.pass("Metadata and content shards agree");
    }
    Ok(())
}

fn check_file(path: &Path, verify_hashes: bool, d: &mut DiagResult) -> Result<()> {
    let report = inspect_file(path, verify_hashes)?;
    d.info(&format!("Identifier: {}", report.identity.identifier()));

    if report.space_root.is_none() {
        return Ok(());
    }
    if !report.metadata_shard_present {
        d.info("No versions recorded");
        return Ok(());
    }
    d.pass(&format!("{} version(s) recorded", report.records));

    for skipped in &report.skipped {
        d.warn(&format!(
            "Unreadable record {}: {}",
            skipped.path.display(),
            skipped.reason
        ));
    }
    if report.records > 0 && !report.content_shard_present {
        d.fail("Content shard missing");
    }
    for fault in &report.faults {
        match fault {
            IntegrityFault::MissingBlob(record) => {
                d.fail(&format!("Version {} has no blob", record.id))
            }
            IntegrityFault::HashMismatch { record, .. } => {
                d.fail(&format!("Version {} blob does not match its hash", record.id))
            }
        }
    }
    if report.faults.is_empty() && report.records > 0 {
        let how = if verify_hashes { "verified" } else { "present" };
        d.pass(&format!("All blobs {}", how));
    }
    if !report.orphan_blobs.is_empty() {
        d.warn(&format!(
            "{} blob(s) not referenced by any record",
            report.orphan_blobs.len()
        ));
        d.info("Left by interrupted writes; safe to delete");
    }
    Ok(())
}
