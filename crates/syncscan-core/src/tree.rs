//! Scan requests and their results.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::filter::HardFilter;
use crate::node::FolderContainer;
use crate::path::AbstractPath;

/// How symbolic links are treated during traversal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum SymlinkHandling {
    /// Skip links entirely.
    #[default]
    Exclude,
    /// Record the link itself, never follow it.
    Direct,
    /// Follow the link and record whatever it points to.
    Follow,
}

/// One traversal request: a base folder plus how to filter it.
///
/// Keys order by folder path first, then symlink policy, then filter
/// identity: two keys only collapse when they share the same filter
/// instance.
#[derive(Debug, Clone)]
pub struct DirectoryKey {
    pub folder_path: AbstractPath,
    pub filter: Arc<dyn HardFilter>,
    pub handle_symlinks: SymlinkHandling,
}

impl DirectoryKey {
    pub fn new(
        folder_path: impl Into<AbstractPath>,
        filter: Arc<dyn HardFilter>,
        handle_symlinks: SymlinkHandling,
    ) -> Self {
        Self {
            folder_path: folder_path.into(),
            filter,
            handle_symlinks,
        }
    }

    fn filter_addr(&self) -> usize {
        Arc::as_ptr(&self.filter) as *const () as usize
    }
}

impl PartialEq for DirectoryKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DirectoryKey {}

impl PartialOrd for DirectoryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DirectoryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folder_path
            .cmp(&other.folder_path)
            .then(self.handle_symlinks.cmp(&other.handle_symlinks))
            .then(self.filter_addr().cmp(&other.filter_addr()))
    }
}

impl Hash for DirectoryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folder_path.hash(state);
        self.handle_symlinks.hash(state);
        self.filter_addr().hash(state);
    }
}

/// Result of scanning one [`DirectoryKey`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryValue {
    /// Snapshot of the base folder.
    pub folder_cont: FolderContainer,
    /// Directories that could not be read: relative path → error message.
    /// The base folder itself is keyed by the empty string.
    pub failed_folder_reads: BTreeMap<String, String>,
    /// Items that could not be read: relative path → error message.
    pub failed_item_reads: BTreeMap<String, String>,
}

impl DirectoryValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if any directory or item failed.
    pub fn has_failures(&self) -> bool {
        !self.failed_folder_reads.is_empty() || !self.failed_item_reads.is_empty()
    }
}
