//! # augment-config
//!
//! Configuration management for augment.
//!
//! Loads configuration from:
//! 1. `<config_dir>/augment/config.toml` (global)
//! 2. `.augment/config.toml` in the working directory (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! An explicit file (`augment --config <file>`) replaces layers 1 and 2.

pub mod logging;
pub mod path;
pub mod testing;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use tracing::{debug, warn};

use crate::logging::LogLevel;

/// Project-local config file, relative to the working directory
pub const PROJECT_CONFIG: &str = ".augment/config.toml";

pub const ENV_LAZY_INIT: &str = "AUGMENT_LAZY_INIT";
pub const ENV_SYNC_WRITES: &str = "AUGMENT_SYNC_WRITES";
pub const ENV_LOG_LEVEL: &str = "AUGMENT_LOG_LEVEL";

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(PoisonError::into_inner)
}

/// Reload config from the standard locations
pub fn reload() -> Result<(), ConfigError> {
    reload_with(None)
}

/// Reload config, from `explicit` if given, otherwise from the standard
/// locations
pub fn reload_with(explicit: Option<&Path>) -> Result<(), ConfigError> {
    let new_config = match explicit {
        Some(path) => Config::load_file(path)?,
        None => Config::load()?,
    };
    *CONFIG.write().unwrap_or_else(PoisonError::into_inner) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub doctor: DoctorConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!(path = %global_path.display(), "loading global config");
                config = Self::read(&global_path)?;
            }
        }

        let project_path = Path::new(PROJECT_CONFIG);
        if project_path.exists() {
            debug!(path = %project_path.display(), "loading project config");
            let project_config = Self::read(project_path)?;
            config.merge(project_config);
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load a single file, then apply environment overrides
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading config file");
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Global config path: `<config_dir>/augment/config.toml`
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("augment").join("config.toml"))
    }

    /// Merge a project config over this one. Only values that differ from
    /// the defaults take effect.
    pub fn merge(&mut self, other: Config) {
        let defaults = Config::default();
        if other.store.lazy_init != defaults.store.lazy_init {
            self.store.lazy_init = other.store.lazy_init;
        }
        if other.store.sync_writes != defaults.store.sync_writes {
            self.store.sync_writes = other.store.sync_writes;
        }
        if other.logging.level != defaults.logging.level {
            self.logging.level = other.logging.level;
        }
        if other.doctor.verify_hashes != defaults.doctor.verify_hashes {
            self.doctor.verify_hashes = other.doctor.verify_hashes;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Set-but-empty counts as unset.
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()));
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(value) = var(ENV_LAZY_INIT) {
            match parse_bool(&value) {
                Some(b) => self.store.lazy_init = b,
                None => warn!(key = ENV_LAZY_INIT, %value, "ignoring non-boolean override"),
            }
        }
        if let Some(value) = var(ENV_SYNC_WRITES) {
            match parse_bool(&value) {
                Some(b) => self.store.sync_writes = b,
                None => warn!(key = ENV_SYNC_WRITES, %value, "ignoring non-boolean override"),
            }
        }
        if let Some(value) = var(ENV_LOG_LEVEL) {
            match value.parse::<LogLevel>() {
                Ok(_) => self.logging.level = value.to_ascii_lowercase(),
                Err(_) => warn!(key = ENV_LOG_LEVEL, %value, "ignoring unknown log level"),
            }
        }
    }

    /// Configured log level, falling back to `warn` if unparseable
    pub fn log_level(&self) -> LogLevel {
        self.logging.level.parse().unwrap_or(LogLevel::Warn)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        Config::default().to_toml()
    }

    pub fn to_toml(&self) -> String {
        // Plain structs of bools and strings always serialize.
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Version store behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Provision a space in the file's directory when a history read finds none
    pub lazy_init: bool,
    /// fsync blobs and records before renaming them into place
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lazy_init: true,
            sync_writes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// error, warn, info, debug or trace
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// `augment doctor` settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoctorConfig {
    /// Re-digest every blob instead of only checking it exists
    pub verify_hashes: bool,
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self {
            verify_hashes: true,
        }
    }
}
