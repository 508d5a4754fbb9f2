//! Parallel folder scanning engine for syncscan.
//!
//! This crate builds in-memory snapshots of a set of requested folders,
//! the data-gathering stage of a folder comparison.
//!
//! # Overview
//!
//! - **One thread per storage root**: folders on the same disk or host are
//!   traversed by the same worker, different roots run in parallel
//! - **Serialized error handling**: read errors from all workers are handed
//!   one at a time to the calling thread, which decides to retry or continue
//! - **Throttled status**: only one worker publishes its current item, at
//!   most once per interval
//! - **Filtering with pruning**: excluded folders are not descended into
//!   unless something below them may still be included
//! - **Cooperative cancellation**: workers unwind between items when the
//!   run is aborted
//!
//! # Example
//!
//! ```rust,no_run
//! use std::collections::{BTreeMap, BTreeSet};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use syncscan_scan::{
//!     DeviceParallelOps, DirectoryKey, ErrorDecision, FillBufferCallback, LocalFileSystem,
//!     NullFilter, ScanError, SymlinkHandling, fill_buffer,
//! };
//!
//! struct Console;
//!
//! impl FillBufferCallback for Console {
//!     fn report_status(&mut self, status_msg: &str, items_scanned: u64) -> Result<(), ScanError> {
//!         eprintln!("{status_msg} ({items_scanned} items)");
//!         Ok(())
//!     }
//!
//!     fn report_error(
//!         &mut self,
//!         msg: &str,
//!         _retry_number: usize,
//!     ) -> Result<ErrorDecision, ScanError> {
//!         eprintln!("{msg}");
//!         Ok(ErrorDecision::Continue)
//!     }
//! }
//!
//! let mut folders = BTreeSet::new();
//! folders.insert(DirectoryKey::new("/data", Arc::new(NullFilter), SymlinkHandling::Direct));
//!
//! let mut buf = BTreeMap::new();
//! fill_buffer(
//!     &LocalFileSystem::new(),
//!     &folders,
//!     &mut buf,
//!     &DeviceParallelOps::new(),
//!     &mut Console,
//!     Duration::from_millis(100),
//! )
//! .unwrap();
//!
//! for (key, value) in &buf {
//!     println!("{}: {} items", key.folder_path, value.folder_cont.item_count());
//! }
//! ```

pub mod afs;
mod async_callback;
mod cancel;
mod local;
mod parallel_scan;
mod traverser;

pub use afs::{
    FileInfo, FileSystem, FolderInfo, HandleError, HandleLink, SymlinkInfo, TraverserCallback,
    TraverserWorkload,
};
pub use async_callback::{AsyncCallback, ReportThrottle};
pub use cancel::{CancellationToken, Cancelled};
pub use local::LocalFileSystem;
pub use parallel_scan::{ErrorDecision, FillBufferCallback, fill_buffer};
pub use traverser::{
    DirCallback, LOCK_FILE_ENDING, MAX_TRAVERSAL_LEVEL, SYNC_DB_FILE_ENDING, TraverserConfig,
};

// Re-export core types for convenience
pub use syncscan_core::{
    AbstractPath, DeviceParallelOps, DirFilterMatch, DirectoryKey, DirectoryValue, ErrorPolicy,
    FileAttributes, FileId, FolderContainer, HardFilter, LinkAttributes, NameFilter, NullFilter,
    PathComponents, ScanConfig, ScanError, SymlinkHandling,
};
