//! Backend-agnostic paths.

use std::fmt;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Separator used in relative paths, independent of the backend.
pub const FILE_NAME_SEPARATOR: char = '/';

/// A path as understood by a filesystem backend.
///
/// For local disks this is the native path string; remote backends use
/// their own URL-like phrases.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbstractPath(CompactString);

impl AbstractPath {
    pub fn new(path: impl Into<CompactString>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a `/`-separated relative path.
    pub fn append_rel_path(&self, rel_path: &str) -> AbstractPath {
        let rel_path = rel_path.trim_start_matches(FILE_NAME_SEPARATOR);
        if rel_path.is_empty() {
            return self.clone();
        }
        let mut out = self.0.clone();
        if !out.ends_with(FILE_NAME_SEPARATOR) && !out.ends_with(std::path::MAIN_SEPARATOR) {
            out.push(FILE_NAME_SEPARATOR);
        }
        out.push_str(rel_path);
        AbstractPath(out)
    }
}

impl fmt::Display for AbstractPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AbstractPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AbstractPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A path split into its storage root and the remainder below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathComponents {
    /// Drive, mount point or remote host the path lives on.
    pub root_path: AbstractPath,
    /// `/`-separated path relative to `root_path`; empty for the root itself.
    pub rel_path: String,
}

impl PathComponents {
    pub fn new(root_path: AbstractPath, rel_path: impl Into<String>) -> Self {
        Self {
            root_path,
            rel_path: rel_path.into(),
        }
    }
}
