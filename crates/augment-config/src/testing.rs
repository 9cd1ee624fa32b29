//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary project directory (no space provisioned)
//! - An isolated home and config directory
//!
//! # Usage
//!
//! ```ignore
//! use augment_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let file = env.create_file("src/a.txt", b"v1").unwrap();
//!     // spawn `augment` with .envs(env.cli_env()) and .current_dir(&env.project_root)
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{ENV_LAZY_INIT, ENV_LOG_LEVEL, ENV_SYNC_WRITES, PROJECT_CONFIG};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated directories for one test
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Project directory; becomes a space only once something provisions it
    pub project_root: PathBuf,
    /// Stand-in `$HOME`
    pub home: PathBuf,
    /// Stand-in `$XDG_CONFIG_HOME`
    pub config_home: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let project_root = root.join(format!("project-{}", test_id));
        let home = root.join("home");
        let config_home = home.join(".config");

        std::fs::create_dir_all(&project_root)?;
        std::fs::create_dir_all(&config_home)?;

        Ok(Self {
            _temp_dir: temp_dir,
            project_root,
            home,
            config_home,
            test_id,
        })
    }

    /// Create a test file with content
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.project_root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a test directory
    pub fn create_dir(&self, relative_path: &str) -> anyhow::Result<PathBuf> {
        let path = self.project_root.join(relative_path);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Where the global config lives for processes started with [`Self::cli_env`]
    /// on XDG platforms.
    pub fn global_config_path(&self) -> PathBuf {
        self.config_home.join("augment").join("config.toml")
    }

    /// Write a project-local config. This creates the marker directory, so
    /// the project root is a (bare) space afterwards.
    pub fn write_project_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        self.create_file(PROJECT_CONFIG, contents.as_bytes())
    }

    /// Environment for spawning `augment` against this environment.
    ///
    /// Points home and config lookups into the temp dir and clears the
    /// override variables so the host's settings cannot leak in.
    pub fn cli_env(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("HOME".to_string(), self.home.display().to_string()),
            (
                "XDG_CONFIG_HOME".to_string(),
                self.config_home.display().to_string(),
            ),
        ];
        for key in [ENV_LAZY_INIT, ENV_SYNC_WRITES, ENV_LOG_LEVEL] {
            vars.push((key.to_string(), String::new()));
        }
        vars
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_creates_directories() {
        let env = TestEnvironment::new().unwrap();
        assert!(env.project_root.exists());
        assert!(env.config_home.exists());
        assert!(!env.project_root.join(".augment").exists());
    }

    #[test]
    fn test_environments_are_isolated() {
        let env1 = TestEnvironment::new().unwrap();
        let env2 = TestEnvironment::new().unwrap();
        assert_ne!(env1.project_root, env2.project_root);
        assert_ne!(env1.test_id, env2.test_id);
    }

    #[test]
    fn test_create_file() {
        let env = TestEnvironment::new().unwrap();
        let path = env.create_file("src/main.rs", b"fn main() {}").unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"fn main() {}");
    }

    #[test]
    fn test_cli_env() {
        let env = TestEnvironment::new().unwrap();
        let vars = env.cli_env();
        assert!(vars.iter().any(|(k, _)| k == "XDG_CONFIG_HOME"));
        assert!(vars.iter().any(|(k, v)| k == ENV_LAZY_INIT && v.is_empty()));
    }
}
