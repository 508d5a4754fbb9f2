//! Scan configuration types.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ScanError;
use crate::filter::{HardFilter, NameFilter};
use crate::path::AbstractPath;
use crate::tree::SymlinkHandling;

/// What to do when a directory or item cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ErrorPolicy {
    /// Ask the user for every error.
    #[default]
    Prompt,
    /// Record the error and carry on.
    Continue,
    /// Stop the whole run on the first error.
    Abort,
}

/// Configuration for a scan run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Folders to scan.
    pub folders: Vec<String>,

    /// Symlink policy applied to every folder.
    #[builder(default)]
    #[serde(default)]
    pub handle_symlinks: SymlinkHandling,

    /// Include patterns (glob syntax, relative to each folder).
    #[builder(default)]
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Exclude patterns (glob syntax, relative to each folder).
    #[builder(default)]
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Parallel operations per storage root.
    #[builder(default = "1")]
    #[serde(default = "default_parallel_ops")]
    pub parallel_ops: usize,

    /// Status callback interval in milliseconds.
    #[builder(default = "100")]
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    /// Reaction to read errors.
    #[builder(default)]
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

fn default_parallel_ops() -> usize {
    1
}

fn default_status_interval_ms() -> u64 {
    100
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.folders {
            Some(ref folders) if folders.is_empty() => {
                return Err("At least one folder is required".to_string());
            }
            Some(ref folders) if folders.iter().any(|f| f.trim().is_empty()) => {
                return Err("Folder path cannot be empty".to_string());
            }
            Some(_) => {}
            None => return Err("At least one folder is required".to_string()),
        }
        if self.parallel_ops == Some(0) {
            return Err("Parallel operations must be at least 1".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning some folders.
    pub fn new<I, S>(folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            folders: folders.into_iter().map(Into::into).collect(),
            handle_symlinks: SymlinkHandling::default(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            parallel_ops: default_parallel_ops(),
            status_interval_ms: default_status_interval_ms(),
            error_policy: ErrorPolicy::default(),
        }
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        let config: ScanConfig =
            serde_json::from_str(&text).map_err(|e| ScanError::InvalidConfig {
                message: format!("{}: {e}", path.display()),
            })?;
        if config.folders.is_empty() {
            return Err(ScanError::InvalidConfig {
                message: format!("{}: no folders configured", path.display()),
            });
        }
        Ok(config)
    }

    /// Status callback interval.
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Build the filter shared by all folders of this config.
    pub fn build_filter(&self) -> Result<Arc<dyn HardFilter>, ScanError> {
        Ok(Arc::new(NameFilter::new(
            &self.include_patterns,
            &self.exclude_patterns,
        )?))
    }
}

/// Desired parallel operations per storage root.
///
/// Roots without an entry get one operation at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceParallelOps(BTreeMap<AbstractPath, usize>);

impl DeviceParallelOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parallel operations for `root`, at least 1.
    pub fn get(&self, root: &AbstractPath) -> usize {
        self.0.get(root).copied().unwrap_or(1).max(1)
    }

    /// Raise the value for `root`. Several folders sharing a root keep
    /// the largest setting.
    pub fn set(&mut self, root: AbstractPath, parallel_ops: usize) {
        let prev = self.get(&root);
        let value = parallel_ops.max(prev);
        if value > 1 {
            self.0.insert(root, value);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
