//! Launchpad configuration and validation.
//!
//! Configuration is read from a TOML file:
//!
//! ```toml
//! base_dir = "/tmp/launchpad-sandboxes"
//! tree_path = "project.json"
//! terminal_capacity = 1024
//! ```
//!
//! Every field is optional. Validate before booting to catch errors early.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming the config file used by the CLI.
pub const CONFIG_ENV: &str = "LAUNCHPAD_CONFIG";

/// Launchpad settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchpadConfig {
    /// Directory sandboxes are created under.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Tree document to mount. The built-in starter project is used when unset.
    #[serde(default)]
    pub tree_path: Option<PathBuf>,

    /// Terminal events buffered per live subscriber.
    #[serde(default = "default_terminal_capacity")]
    pub terminal_capacity: usize,
}

fn default_base_dir() -> PathBuf {
    std::env::temp_dir().join("launchpad-sandboxes")
}

fn default_terminal_capacity() -> usize {
    1024
}

impl Default for LaunchpadConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            tree_path: None,
            terminal_capacity: default_terminal_capacity(),
        }
    }
}

impl LaunchpadConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&raw)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    /// Sets the tree document to mount.
    pub fn with_tree_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tree_path = Some(path.into());
        self
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Fatal problems.
    pub errors: Vec<String>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors; returns warnings.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    fn validate(&self) -> ValidationResult;
}

impl Validate for LaunchpadConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.terminal_capacity == 0 {
            result.add_error("terminal_capacity must be greater than zero");
        }

        if self.base_dir.as_os_str().is_empty() {
            result.add_error("base_dir cannot be empty");
        } else if self.base_dir.is_relative() {
            result.add_warning(format!(
                "base_dir '{}' is relative to the current directory",
                self.base_dir.display()
            ));
        }

        if let Some(tree_path) = &self.tree_path {
            if !tree_path.is_file() {
                result.add_error(format!(
                    "tree_path '{}' does not exist or is not a file",
                    tree_path.display()
                ));
            } else if tree_path.extension().and_then(|e| e.to_str()) != Some("json") {
                result.add_warning(format!(
                    "tree_path '{}' does not have a .json extension",
                    tree_path.display()
                ));
            }
        }

        result
    }
}
