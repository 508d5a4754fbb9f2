//! Filesystem backend abstraction.
//!
//! A backend resolves paths into storage roots and drives a
//! [`TraverserCallback`] per requested folder. Handlers form a tree: the
//! handler returned from [`TraverserCallback::on_folder`] borrows its
//! parent, so the backend must finish a child before it reports the next
//! item to the parent.

use compact_str::CompactString;
use syncscan_core::{AbstractPath, FileId, PathComponents};

use crate::cancel::Cancelled;

/// A file reported by the backend.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub item_name: CompactString,
    pub file_size: u64,
    /// Seconds since the unix epoch.
    pub mod_time: i64,
    pub file_id: FileId,
    /// Reached by following a symlink.
    pub is_followed_symlink: bool,
}

/// A folder reported by the backend.
#[derive(Debug, Clone)]
pub struct FolderInfo {
    pub item_name: CompactString,
    pub is_followed_symlink: bool,
}

/// A symlink reported by the backend.
#[derive(Debug, Clone)]
pub struct SymlinkInfo {
    pub item_name: CompactString,
    /// Modification time of the link itself.
    pub mod_time: i64,
}

/// What the backend should do with a symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleLink {
    Skip,
    /// Resolve the target and report it as file or folder.
    Follow,
}

/// What the backend should do after a read error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// Skip the failed entry.
    Continue,
    /// Attempt the same operation again.
    Retry,
}

/// Receiver of traversal events for one directory level.
pub trait TraverserCallback: Send {
    /// Handler for a sub folder, borrowing this one.
    type Child<'a>: TraverserCallback
    where
        Self: 'a;

    fn on_file(&mut self, fi: &FileInfo) -> Result<(), Cancelled>;

    /// Return `None` to skip the folder's contents.
    fn on_folder(&mut self, fi: &FolderInfo) -> Result<Option<Self::Child<'_>>, Cancelled>;

    fn on_symlink(&mut self, si: &SymlinkInfo) -> Result<HandleLink, Cancelled>;

    /// The directory of this handler could not be enumerated.
    fn report_dir_error(&mut self, msg: &str, retry_number: usize)
    -> Result<HandleError, Cancelled>;

    /// An entry of this handler's directory could not be read.
    fn report_item_error(
        &mut self,
        msg: &str,
        retry_number: usize,
        item_name: &str,
    ) -> Result<HandleError, Cancelled>;
}

/// Folders of one storage root to traverse, each with its base handler.
pub type TraverserWorkload<C> = Vec<(String, C)>;

/// A filesystem backend.
pub trait FileSystem: Sync {
    /// Split a path into storage root and relative remainder.
    fn path_components(&self, path: &AbstractPath) -> PathComponents;

    /// Human-readable form of a path for status and error texts.
    fn display_path(&self, path: &AbstractPath) -> String {
        path.to_string()
    }

    /// Traverse every `(rel_path, handler)` of `workload` below `root`,
    /// using up to `parallel_ops` concurrent operations.
    ///
    /// Returns `Err(Cancelled)` as soon as a handler reports cancellation.
    fn traverse_folder_parallel<C: TraverserCallback>(
        &self,
        root: &AbstractPath,
        workload: TraverserWorkload<C>,
        parallel_ops: usize,
    ) -> Result<(), Cancelled>;
}
