//! Local disk backend.

use std::fs::{self, Metadata};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use compact_str::CompactString;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use syncscan_core::{AbstractPath, FILE_NAME_SEPARATOR, FileId, PathComponents};
use tracing::warn;

use crate::afs::{
    FileInfo, FileSystem, FolderInfo, HandleError, HandleLink, SymlinkInfo, TraverserCallback,
    TraverserWorkload,
};
use crate::cancel::Cancelled;

/// Backend for locally mounted filesystems.
///
/// The storage root of a path is its mount point (on Unix: the topmost
/// ancestor on the same device). Each directory is listed once, then its
/// entries are stat'ed on a pool of `parallel_ops` threads and reported
/// in name order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    fn display_native(&self, path: &Path) -> String {
        self.display_path(&AbstractPath::new(path.to_string_lossy().as_ref()))
    }
}

impl FileSystem for LocalFileSystem {
    fn path_components(&self, path: &AbstractPath) -> PathComponents {
        let native = Path::new(path.as_str());
        let native = std::path::absolute(native).unwrap_or_else(|_| native.to_path_buf());

        let root = storage_root(&native);
        let rel_path = native
            .strip_prefix(&root)
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default();

        PathComponents::new(AbstractPath::new(root.to_string_lossy().as_ref()), rel_path)
    }

    fn traverse_folder_parallel<C: TraverserCallback>(
        &self,
        root: &AbstractPath,
        workload: TraverserWorkload<C>,
        parallel_ops: usize,
    ) -> Result<(), Cancelled> {
        let root = PathBuf::from(root.as_str());
        let run = || {
            workload
                .into_par_iter()
                .try_for_each(|(rel_path, mut callback)| {
                    traverse_dir(self, &join_rel_path(&root, &rel_path), &mut callback)
                })
        };

        match ThreadPoolBuilder::new()
            .num_threads(parallel_ops.max(1))
            .thread_name(|i| format!("Traverser-io[{i}]"))
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!(error = %e, "failed to build I/O pool, traversing on the current thread");
                run()
            }
        }
    }
}

fn join_rel_path(root: &Path, rel_path: &str) -> PathBuf {
    rel_path
        .split(FILE_NAME_SEPARATOR)
        .filter(|c| !c.is_empty())
        .fold(root.to_path_buf(), |path, c| path.join(c))
}

fn traverse_dir<C: TraverserCallback>(
    backend: &LocalFileSystem,
    dir_path: &Path,
    callback: &mut C,
) -> Result<(), Cancelled> {
    let Some(names) = read_dir_with_retry(backend, dir_path, callback)? else {
        return Ok(());
    };

    let mut entries: Vec<(CompactString, PathBuf, io::Result<Metadata>)> = names
        .into_par_iter()
        .map(|(name, path)| {
            let metadata = fs::symlink_metadata(&path);
            (name, path, metadata)
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, path, metadata) in entries {
        visit_entry(backend, callback, &name, &path, metadata)?;
    }
    Ok(())
}

/// `None` if the caller chose to continue past an unreadable directory.
fn read_dir_with_retry<C: TraverserCallback>(
    backend: &LocalFileSystem,
    dir_path: &Path,
    callback: &mut C,
) -> Result<Option<Vec<(CompactString, PathBuf)>>, Cancelled> {
    let mut retry_number = 0;
    loop {
        match list_dir(dir_path) {
            Ok(names) => return Ok(Some(names)),
            Err(e) => {
                let msg = format!(
                    "Cannot read directory \"{}\".\n\n{e}",
                    backend.display_native(dir_path)
                );
                match callback.report_dir_error(&msg, retry_number)? {
                    HandleError::Retry => retry_number += 1,
                    HandleError::Continue => return Ok(None),
                }
            }
        }
    }
}

fn list_dir(dir_path: &Path) -> io::Result<Vec<(CompactString, PathBuf)>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        names.push((entry.file_name().to_string_lossy().into(), entry.path()));
    }
    Ok(names)
}

fn visit_entry<C: TraverserCallback>(
    backend: &LocalFileSystem,
    callback: &mut C,
    name: &str,
    path: &Path,
    mut metadata: io::Result<Metadata>,
) -> Result<(), Cancelled> {
    let mut retry_number = 0;
    let metadata = loop {
        match metadata {
            Ok(m) => break m,
            Err(e) => {
                let msg = format!(
                    "Cannot read file attributes of \"{}\".\n\n{e}",
                    backend.display_native(path)
                );
                match callback.report_item_error(&msg, retry_number, name)? {
                    HandleError::Retry => {
                        retry_number += 1;
                        metadata = fs::symlink_metadata(path);
                    }
                    HandleError::Continue => return Ok(()),
                }
            }
        }
    };

    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        let si = SymlinkInfo {
            item_name: name.into(),
            mod_time: mod_time(&metadata),
        };
        match callback.on_symlink(&si)? {
            HandleLink::Skip => Ok(()),
            HandleLink::Follow => follow_symlink(backend, callback, name, path),
        }
    } else if file_type.is_dir() {
        visit_folder(backend, callback, name, path, false)
    } else {
        // sockets, pipes and devices are listed like files
        callback.on_file(&file_info(name, &metadata, false))
    }
}

fn visit_folder<C: TraverserCallback>(
    backend: &LocalFileSystem,
    callback: &mut C,
    name: &str,
    path: &Path,
    is_followed_symlink: bool,
) -> Result<(), Cancelled> {
    let fi = FolderInfo {
        item_name: name.into(),
        is_followed_symlink,
    };
    if let Some(mut child) = callback.on_folder(&fi)? {
        traverse_dir(backend, path, &mut child)?;
    }
    Ok(())
}

fn follow_symlink<C: TraverserCallback>(
    backend: &LocalFileSystem,
    callback: &mut C,
    name: &str,
    path: &Path,
) -> Result<(), Cancelled> {
    let mut retry_number = 0;
    loop {
        match fs::metadata(path) {
            Ok(target) if target.is_dir() => {
                return visit_folder(backend, callback, name, path, true);
            }
            Ok(target) => return callback.on_file(&file_info(name, &target, true)),
            Err(e) => {
                let msg = format!(
                    "Cannot resolve symbolic link \"{}\".\n\n{e}",
                    backend.display_native(path)
                );
                match callback.report_item_error(&msg, retry_number, name)? {
                    HandleError::Retry => retry_number += 1,
                    HandleError::Continue => return Ok(()),
                }
            }
        }
    }
}

fn file_info(name: &str, metadata: &Metadata, is_followed_symlink: bool) -> FileInfo {
    FileInfo {
        item_name: name.into(),
        file_size: metadata.len(),
        mod_time: mod_time(metadata),
        file_id: file_id(metadata),
        is_followed_symlink,
    }
}

/// Modification time in seconds relative to the unix epoch.
fn mod_time(metadata: &Metadata) -> i64 {
    match metadata.modified() {
        Ok(time) => match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        },
        Err(_) => 0,
    }
}

// Cross-platform metadata helpers

#[cfg(unix)]
fn file_id(metadata: &Metadata) -> FileId {
    FileId::new(metadata.dev(), metadata.ino())
}

#[cfg(not(unix))]
fn file_id(_metadata: &Metadata) -> FileId {
    FileId::default()
}

/// Mount point of `path`: walk up while the device id stays the same.
#[cfg(unix)]
fn storage_root(path: &Path) -> PathBuf {
    // the requested folder need not exist (yet)
    let mut existing = path;
    let device = loop {
        match fs::metadata(existing) {
            Ok(metadata) => break metadata.dev(),
            Err(_) => match existing.parent() {
                Some(parent) => existing = parent,
                None => return path_prefix_root(path),
            },
        }
    };

    let mut root = existing;
    while let Some(parent) = root.parent() {
        match fs::metadata(parent) {
            Ok(metadata) if metadata.dev() == device => root = parent,
            _ => break,
        }
    }
    root.to_path_buf()
}

#[cfg(not(unix))]
fn storage_root(path: &Path) -> PathBuf {
    path_prefix_root(path)
}

/// Drive prefix and root directory, e.g. `C:\` or `/`.
fn path_prefix_root(path: &Path) -> PathBuf {
    path.components()
        .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
        .collect()
}
