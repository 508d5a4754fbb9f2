//! Parallel snapshot of a set of folders, one thread per storage root.
//!
//! Traversing several folders of the same disk in parallel gains nothing
//! since the work is I/O bound, while folders on different disks or hosts
//! scale with the number of threads. Folders are therefore grouped by the
//! storage root they live on; every root gets exactly one worker thread,
//! and the per-root parallelism setting is passed on to the backend.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use syncscan_core::{AbstractPath, DeviceParallelOps, DirectoryKey, DirectoryValue, ScanError};
use tracing::{debug, info, warn};

use crate::afs::FileSystem;
use crate::async_callback::{AsyncCallback, ReportThrottle};
use crate::cancel::{CancellationToken, Cancelled};
use crate::traverser::{DirCallback, TraverserConfig};

/// Caller decision for a read error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDecision {
    /// Record the failure and move on.
    Continue,
    /// Try the same operation again.
    Retry,
}

/// Callback invoked on the calling thread while a scan is running.
///
/// Returning `Err` from either method aborts the scan: all workers are
/// cancelled and joined before the error is returned from [`fill_buffer`].
pub trait FillBufferCallback {
    /// Periodic status, plus one final call after all workers finished.
    fn report_status(&mut self, status_msg: &str, items_scanned: u64) -> Result<(), ScanError>;

    /// A directory or item could not be read. May block, e.g. on user input.
    fn report_error(&mut self, msg: &str, retry_number: usize) -> Result<ErrorDecision, ScanError>;
}

struct WorkItem<'s> {
    key: &'s DirectoryKey,
    rel_path: String,
    value: &'s mut DirectoryValue,
}

struct RootWorkload<'s> {
    root: AbstractPath,
    parallel_ops: usize,
    items: Vec<WorkItem<'s>>,
}

/// Cancels every worker when dropped while armed.
struct CancelOnFailure<'a> {
    tokens: &'a [CancellationToken],
    armed: bool,
}

impl CancelOnFailure<'_> {
    fn fire(&mut self) {
        if self.armed {
            warn!(workers = self.tokens.len(), "scan failed, cancelling traverser threads");
            for token in self.tokens {
                token.cancel();
            }
            self.armed = false;
        }
    }
}

impl Drop for CancelOnFailure<'_> {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Deregisters a worker on every exit path, panics included.
struct WorkEndGuard<'a> {
    acb: &'a AsyncCallback,
    thread_idx: usize,
}

impl Drop for WorkEndGuard<'_> {
    fn drop(&mut self) {
        self.acb.notify_work_end(self.thread_idx);
    }
}

/// Scan `folders_to_read` into `buf`.
///
/// `buf` is cleared and gets exactly one entry per requested folder before
/// any thread starts. On error (callback abort, thread start failure,
/// worker panic) `buf` keeps whatever the workers collected up to that
/// point.
pub fn fill_buffer<F: FileSystem>(
    fs: &F,
    folders_to_read: &BTreeSet<DirectoryKey>,
    buf: &mut BTreeMap<DirectoryKey, DirectoryValue>,
    device_parallel_ops: &DeviceParallelOps,
    callback: &mut dyn FillBufferCallback,
    cb_interval: Duration,
) -> Result<(), ScanError> {
    let start = Instant::now();
    buf.clear();

    let mut per_device_folders: BTreeMap<AbstractPath, Vec<(&DirectoryKey, String)>> =
        BTreeMap::new();
    for key in folders_to_read {
        let pc = fs.path_components(&key.folder_path);
        per_device_folders
            .entry(pc.root_path)
            .or_default()
            .push((key, pc.rel_path));
        buf.insert(key.clone(), DirectoryValue::new());
    }

    // unshared slots: every worker writes only to its own values
    let mut slots: BTreeMap<&DirectoryKey, &mut DirectoryValue> = buf.iter_mut().collect();

    let mut workloads = Vec::with_capacity(per_device_folders.len());
    for (root, folders) in per_device_folders {
        let parallel_ops = device_parallel_ops.get(&root);
        let mut items = Vec::with_capacity(folders.len());
        for (key, rel_path) in folders {
            let value = slots.remove(key).ok_or_else(|| ScanError::Other {
                message: format!("no result slot for {}", key.folder_path),
            })?;
            items.push(WorkItem {
                key,
                rel_path,
                value,
            });
        }
        workloads.push(RootWorkload {
            root,
            parallel_ops,
            items,
        });
    }

    info!(
        folders = folders_to_read.len(),
        roots = workloads.len(),
        "starting folder scan"
    );

    let acb = AsyncCallback::new(workloads.len(), cb_interval);
    let tokens: Vec<CancellationToken> =
        workloads.iter().map(|_| CancellationToken::new()).collect();

    std::thread::scope(|scope| -> Result<(), ScanError> {
        // interrupt all first, then join
        let mut cancel_guard = CancelOnFailure {
            tokens: &tokens,
            armed: true,
        };

        let mut handles = Vec::with_capacity(workloads.len());
        let mut spawn_error = None;
        for (thread_idx, (workload, token)) in workloads.into_iter().zip(&tokens).enumerate() {
            let acb = &acb;
            let spawned = std::thread::Builder::new()
                .name(format!("Traverser[{thread_idx}]"))
                .spawn_scoped(scope, move || run_worker(fs, acb, thread_idx, workload, token));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    spawn_error = Some(ScanError::Other {
                        message: format!("failed to start traverser thread: {e}"),
                    });
                    break;
                }
            }
        }

        let waited = match spawn_error {
            Some(e) => Err(e),
            None => acb.wait_until_done(cb_interval, callback),
        };
        if waited.is_err() {
            cancel_guard.fire();
        }

        // a panicked worker must not escape the scope, even after an abort
        let mut joined = Ok(());
        for (thread_idx, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() && joined.is_ok() {
                joined = Err(ScanError::WorkerPanicked { thread_idx });
            }
        }
        cancel_guard.armed = false;

        waited.and(joined)
    })?;

    info!(
        items = acb.items_scanned(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "folder scan finished"
    );
    Ok(())
}

fn run_worker<F: FileSystem>(
    fs: &F,
    acb: &AsyncCallback,
    thread_idx: usize,
    workload: RootWorkload<'_>,
    cancel: &CancellationToken,
) {
    acb.notify_work_begin(thread_idx, workload.parallel_ops);
    let _work_end = WorkEndGuard { acb, thread_idx };
    let report_throttle = ReportThrottle::new();

    debug!(
        thread_idx,
        root = %workload.root,
        folders = workload.items.len(),
        parallel_ops = workload.parallel_ops,
        "traverser started"
    );

    let configs: Vec<TraverserConfig<'_, F>> = workload
        .items
        .iter()
        .map(|item| {
            let key = item.key;
            TraverserConfig {
                base_folder_path: &key.folder_path,
                filter: &*key.filter,
                handle_symlinks: key.handle_symlinks,
                acb,
                thread_idx,
                report_throttle: &report_throttle,
                cancel,
                fs,
            }
        })
        .collect();

    let trav_workload: Vec<(String, DirCallback<'_, F>)> = workload
        .items
        .into_iter()
        .zip(&configs)
        .map(|(item, cfg)| (item.rel_path, DirCallback::base(cfg, item.value)))
        .collect();

    match fs.traverse_folder_parallel(&workload.root, trav_workload, workload.parallel_ops) {
        Ok(()) => debug!(thread_idx, "traverser finished"),
        // cancellation is a regular way for a worker to end
        Err(Cancelled) => debug!(thread_idx, "traverser cancelled"),
    }
}
