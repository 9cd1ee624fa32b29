//! # augment CLI
//!
//! Command-line interface for per-file version history in augment spaces.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;

use augment_config::path::{absolutize, compute_relative_path};
use augment_config::{log_cli_debug, log_cli_info, Config, PROJECT_CONFIG};
use augment_store::{ensure_space, find_space_root, FileIdentity, Space, StoreOptions, VersionStore};

mod doctor;
mod history;

/// augment - per-file version history
#[derive(Parser)]
#[command(name = "augment")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the global and project files
    #[arg(long, global = true, env = "AUGMENT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a space (idempotent; repairs missing compartments)
    Init {
        #[arg(value_name = "DIR")]
        directory: Option<PathBuf>,
    },

    /// Print the root of the space governing a file
    Where {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print a file's identifier and shard directories
    Id {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Store the file's current content as a new version
    Save {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Version comment
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List a file's versions, newest first
    Log {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Check every blob and report missing or corrupt ones
        #[arg(long)]
        verify: bool,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a version's content to stdout
    Cat {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Version id or unique prefix
        #[arg(value_name = "VERSION")]
        version: String,
    },

    /// Replace a file with one of its versions, saving the current content first
    Restore {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Version id or unique prefix
        #[arg(value_name = "VERSION")]
        version: String,

        /// Comment for the pre-restore backup version
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Diagnose a space or a file's history
    Doctor {
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },

    /// Show or create configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file locations
    Path,
    /// Write a default config file
    Init {
        /// Write the global file instead of the project file
        #[arg(long)]
        global: bool,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    augment_config::reload_with(cli.config.as_deref()).context("failed to load configuration")?;
    augment_config::logging::init_logging(augment_config::config().log_level());

    match cli.command {
        Commands::Init { directory } => cmd_init(&absolutize(dir_or_cwd(directory))?),
        Commands::Where { file } => cmd_where(&absolutize(file)?),
        Commands::Id { file } => cmd_id(&absolutize(file)?),
        Commands::Save { file, message } => cmd_save(&absolutize(file)?, message.as_deref()),
        Commands::Log { file, verify, json } => {
            history::cmd_log(&open_store(), &absolutize(file)?, verify, json)
        }
        Commands::Cat { file, version } => cmd_cat(&absolutize(file)?, &version),
        Commands::Restore {
            file,
            version,
            message,
        } => cmd_restore(&absolutize(file)?, &version, message.as_deref()),
        Commands::Doctor { path } => {
            let verify_hashes = augment_config::config().doctor.verify_hashes;
            doctor::cmd_doctor(&absolutize(dir_or_cwd(path))?, verify_hashes)
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                print!("{}", augment_config::config().to_toml());
                Ok(())
            }
            ConfigCommands::Path => cmd_config_path(),
            ConfigCommands::Init { global, force } => cmd_config_init(global, force),
        },
    }
}

fn dir_or_cwd(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| PathBuf::from("."))
}

/// Store with the configured options. The store itself never reads config.
fn open_store() -> VersionStore {
    let cfg = augment_config::config();
    VersionStore::with_options(StoreOptions {
        lazy_init: cfg.store.lazy_init,
        sync_writes: cfg.store.sync_writes,
    })
}

fn cmd_init(directory: &Path) -> Result<()> {
    if !directory.is_dir() {
        anyhow::bail!("not a directory: {}", directory.display());
    }
    let space = ensure_space(directory)?;
    log_cli_info!("space initialized", root = &*space.root().to_string_lossy());
    println!("Initialized augment space in {}", space.root().display());
    Ok(())
}

fn cmd_where(file: &Path) -> Result<()> {
    match find_space_root(file) {
        Some(root) => {
            println!("{}", root.display());
            Ok(())
        }
        None => {
            eprintln!("No augment space governs {}", file.display());
            std::process::exit(1);
        }
    }
}

fn cmd_id(file: &Path) -> Result<()> {
    let identity = FileIdentity::new(file)?;
    println!("{}", identity.identifier());

    match find_space_root(file) {
        Some(root) => {
            let space = Space::at(&root);
            println!("space:    {}", root.display());
            println!(
                "file:     {}",
                compute_relative_path(&root, identity.path()).display()
            );
            println!("metadata: {}", space.metadata_shard(&identity).display());
            println!("content:  {}", space.content_shard(&identity).display());
        }
        None => println!("space:    {}", style("(none)").dim()),
    }
    Ok(())
}

fn cmd_save(file: &Path, message: Option<&str>) -> Result<()> {
    let store = open_store();
    let record = store
        .snapshot_file(file, message)
        .with_context(|| format!("failed to save {}", file.display()))?;

    log_cli_debug!("version saved", version_id = record.id.as_str(), size = record.size);
    println!(
        "Saved {} as version {} ({} bytes)",
        file.display(),
        style(&record.id).yellow(),
        record.size
    );
    Ok(())
}

fn cmd_cat(file: &Path, version: &str) -> Result<()> {
    let store = open_store();
    let record = history::resolve_version(&store, file, version)?;
    let content = store.read_content(&record)?;

    let mut stdout = io::stdout().lock();
    match stdout.write_all(&content).and_then(|_| stdout.flush()) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other.context("failed to write to stdout"),
    }
}

fn cmd_restore(file: &Path, version: &str, message: Option<&str>) -> Result<()> {
    let store = open_store();
    let record = history::resolve_version(&store, file, version)?;
    let backup = store
        .restore_version(file, &record.id, message)
        .with_context(|| format!("failed to restore {}", file.display()))?;

    if let Some(backup) = backup {
        println!(
            "Saved current content as version {}",
            style(&backup.id).yellow()
        );
    }
    println!(
        "Restored {} to version {} ({})",
        file.display(),
        style(&record.id).yellow(),
        history::format_timestamp(&record)
    );
    Ok(())
}

fn cmd_config_path() -> Result<()> {
    match Config::global_config_path() {
        Some(path) => println!("global:  {}", path.display()),
        None => println!("global:  (no config directory)"),
    }
    println!("project: {}", absolutize(PROJECT_CONFIG)?.display());
    Ok(())
}

fn cmd_config_init(global: bool, force: bool) -> Result<()> {
    let path = if global {
        Config::global_config_path().context("cannot determine config directory")?
    } else {
        absolutize(PROJECT_CONFIG)?
    };
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, Config::default_toml())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
