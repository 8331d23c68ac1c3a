//! Configuration System
//!
//! Layered configuration: built-in defaults, the user's global config file, the
//! repository's `objstat.toml`, then `OBJSTAT__*` environment variables. CLI
//! flags are applied on top by the command layer.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// File name of the catalog database inside the git directory.
pub const DEFAULT_CATALOG_DIR: &str = "objstat-catalog";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjstatConfig {
    /// Repository to analyse (working tree or bare git directory)
    #[serde(default = "default_repository")]
    pub repository: PathBuf,

    /// Catalog storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Progress meter
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Baseline used by layout reports
    #[serde(default)]
    pub baseline: BaselineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_repository() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ObjstatConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            storage: StorageConfig::default(),
            progress: ProgressConfig::default(),
            baseline: BaselineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Catalog storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Catalog database path; defaults to `<git dir>/objstat-catalog`
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the catalog path. Relative paths are taken from the git directory.
    pub fn resolve_catalog_path(&self, git_dir: &Path) -> PathBuf {
        match &self.catalog_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => git_dir.join(path),
            None => git_dir.join(DEFAULT_CATALOG_DIR),
        }
    }
}

/// Progress meter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_progress_enabled")]
    pub enabled: bool,

    /// Minimum time between redraws
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_progress_enabled() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    100
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: default_progress_enabled(),
            interval_ms: default_interval_ms(),
        }
    }
}

/// Where the "already efficiently stored" set comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineSource {
    /// Objects listed in the repository's pack indexes
    #[default]
    Pack,
    /// A text file of hashes
    File,
    /// No baseline: every object is new
    #[serde(rename = "none")]
    Disabled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineConfig {
    #[serde(default)]
    pub source: BaselineSource,

    /// Hash list used when `source = "file"`
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Progress(String),
    Baseline(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Progress(msg) => write!(f, "Progress: {}", msg),
            ValidationError::Baseline(msg) => write!(f, "Baseline: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ObjstatConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.progress.interval_ms == 0 {
            errors.push(ValidationError::Progress(
                "interval_ms must be greater than zero".to_string(),
            ));
        }

        if self.baseline.source == BaselineSource::File && self.baseline.file.is_none() {
            errors.push(ValidationError::Baseline(
                "source = \"file\" requires baseline.file".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "json" | "text") {
            errors.push(ValidationError::Logging(format!(
                "unknown format '{}'",
                self.logging.format
            )));
        }
        if self.logging.output == "file" && self.logging.file.is_none() {
            errors.push(ValidationError::Logging(
                "output = \"file\" requires logging.file".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
