//! Core types and traits for syncscan.
//!
//! This crate provides the data structures shared by the scanning engine
//! and its callers: scan requests ([`DirectoryKey`]), their results
//! ([`DirectoryValue`] holding a [`FolderContainer`] snapshot), the filter
//! capability and the run configuration.

mod config;
mod error;
mod filter;
mod node;
mod path;
mod tree;

pub use config::{DeviceParallelOps, ErrorPolicy, ScanConfig, ScanConfigBuilder};
pub use error::ScanError;
pub use filter::{DirFilterMatch, HardFilter, NameFilter, NullFilter};
pub use node::{FileAttributes, FileId, FolderContainer, LinkAttributes, SubFolder};
pub use path::{AbstractPath, FILE_NAME_SEPARATOR, PathComponents};
pub use tree::{DirectoryKey, DirectoryValue, SymlinkHandling};
