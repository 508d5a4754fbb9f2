//! Rendezvous point between traverser threads and the controlling thread.
//!
//! Two independent synchronization domains:
//!
//! - **error handshake + completion**: channels. A zero-capacity channel
//!   hands one error request at a time to the controller, which answers
//!   through a reply channel carried by the request. The last worker to
//!   finish signals the done channel.
//! - **status display**: a mutex around the current file text and the set
//!   of active workers, so an error prompt waiting for user input never
//!   blocks workers publishing progress.
//!
//! The scanned-item counter is a relaxed atomic: mid-run readers may see a
//! slightly stale value, the final value after all workers finished is
//! exact.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, after, bounded, select};
use syncscan_core::ScanError;
use tracing::trace;

use crate::cancel::{CancellationToken, Cancelled};
use crate::parallel_scan::{ErrorDecision, FillBufferCallback};

const NO_THREAD: usize = usize::MAX;

struct ErrorRequest {
    msg: String,
    retry_number: usize,
    reply: Sender<ErrorDecision>,
}

#[derive(Debug, Default)]
struct StatusState {
    current_file: String,
    /// thread index → parallel operations
    active_threads: BTreeMap<usize, usize>,
}

/// Shared state of one scan run.
pub struct AsyncCallback {
    request_tx: Sender<ErrorRequest>,
    request_rx: Receiver<ErrorRequest>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
    threads_to_finish: AtomicUsize,

    status: Mutex<StatusState>,
    notifying_thread_idx: AtomicUsize,
    cb_interval: Duration,

    items_scanned: AtomicU64,
}

impl AsyncCallback {
    pub fn new(threads_to_finish: usize, cb_interval: Duration) -> Self {
        let (request_tx, request_rx) = bounded(0);
        let (done_tx, done_rx) = bounded(1);
        if threads_to_finish == 0 {
            let _ = done_tx.try_send(());
        }
        Self {
            request_tx,
            request_rx,
            done_tx,
            done_rx,
            threads_to_finish: AtomicUsize::new(threads_to_finish),
            status: Mutex::new(StatusState::default()),
            notifying_thread_idx: AtomicUsize::new(NO_THREAD),
            cb_interval,
            items_scanned: AtomicU64::new(0),
        }
    }

    /// Ask the controller how to handle an error. Worker side, blocking.
    ///
    /// Blocks until no other request is pending, then until the controller
    /// answered. Both waits return `Cancelled` when `cancel` is raised.
    pub fn report_error(
        &self,
        msg: &str,
        retry_number: usize,
        cancel: &CancellationToken,
    ) -> Result<ErrorDecision, Cancelled> {
        cancel.check()?;

        let (reply_tx, reply_rx) = bounded(1);
        let request = ErrorRequest {
            msg: msg.to_string(),
            retry_number,
            reply: reply_tx,
        };

        select! {
            send(self.request_tx, request) -> res => res.map_err(|_| Cancelled)?,
            recv(cancel.wakeup()) -> _ => return Err(Cancelled),
        }

        // the reply sender is dropped without answer if the controller aborts
        let decision = select! {
            recv(reply_rx) -> decision => decision.map_err(|_| Cancelled)?,
            recv(cancel.wakeup()) -> _ => return Err(Cancelled),
        };
        trace!(retry_number, ?decision, "error decision received");
        Ok(decision)
    }

    /// Relay errors and status to `callback` until all workers are done.
    /// Controller side.
    ///
    /// An error returned by the callback aborts the loop and is passed on;
    /// the caller is then responsible for cancelling the workers.
    pub fn wait_until_done(
        &self,
        interval: Duration,
        callback: &mut dyn FillBufferCallback,
    ) -> Result<(), ScanError> {
        loop {
            let deadline = after(interval);

            // errors are processed without delay
            loop {
                select! {
                    recv(self.request_rx) -> request => {
                        if let Ok(request) = request {
                            let decision =
                                callback.report_error(&request.msg, request.retry_number)?;
                            // the worker may have been cancelled in the meantime
                            let _ = request.reply.send(decision);
                        }
                    }
                    recv(self.done_rx) -> _ => {
                        // one last call for accurate statistics
                        callback.report_status(&self.current_status(), self.items_scanned())?;
                        return Ok(());
                    }
                    recv(deadline) -> _ => break,
                }
            }

            callback.report_status(&self.current_status(), self.items_scanned())?;
        }
    }

    /// Whether `thread_idx` should publish its current file now.
    ///
    /// Only the active thread with the lowest index reports, and at most
    /// once per interval. `throttle` belongs to the calling worker thread
    /// and is shared by all of its traversals.
    pub fn may_report_current_file(&self, thread_idx: usize, throttle: &ReportThrottle) -> bool {
        if thread_idx != self.notifying_thread_idx.load(Ordering::Relaxed) {
            return false;
        }
        throttle.try_acquire(self.cb_interval)
    }

    pub fn report_current_file(&self, file_path: String) {
        self.lock_status().current_file = file_path;
    }

    pub fn inc_items_scanned(&self) {
        self.items_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn items_scanned(&self) -> u64 {
        self.items_scanned.load(Ordering::Relaxed)
    }

    pub fn notify_work_begin(&self, thread_idx: usize, parallel_ops: usize) {
        let mut status = self.lock_status();
        let previous = status.active_threads.insert(thread_idx, parallel_ops);
        debug_assert!(previous.is_none(), "thread {thread_idx} registered twice");

        self.notifying_thread_idx
            .store(lowest_active(&status), Ordering::Relaxed);
    }

    pub fn notify_work_end(&self, thread_idx: usize) {
        {
            let mut status = self.lock_status();
            let removed = status.active_threads.remove(&thread_idx);
            debug_assert!(removed.is_some(), "thread {thread_idx} was not registered");

            self.notifying_thread_idx
                .store(lowest_active(&status), Ordering::Relaxed);
        }

        let previous = self.threads_to_finish.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0);
        if previous == 1 {
            let _ = self.done_tx.try_send(());
        }
    }

    /// Status line for the controller: `Scanning: [N threads] <file>`.
    pub fn current_status(&self) -> String {
        let (parallel_ops_total, file_path) = {
            let status = self.lock_status();
            let total: usize = status.active_threads.values().sum();
            (total, status.current_file.clone())
        };

        let mut output = String::from("Scanning: ");
        if parallel_ops_total >= 2 {
            output.push_str(&format!("[{parallel_ops_total} threads] "));
        }
        output.push_str(&file_path);
        output
    }

    fn lock_status(&self) -> MutexGuard<'_, StatusState> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lowest_active(status: &StatusState) -> usize {
    status
        .active_threads
        .keys()
        .next()
        .copied()
        .unwrap_or(NO_THREAD)
}

const NEVER_REPORTED: u64 = u64::MAX;

/// Time of the last status publication of one worker thread.
///
/// Lock-free so that a backend may drive the worker's traversals from
/// several I/O threads at once.
#[derive(Debug)]
pub struct ReportThrottle {
    start: Instant,
    /// Nanoseconds since `start`.
    last_report: AtomicU64,
}

impl ReportThrottle {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last_report: AtomicU64::new(NEVER_REPORTED),
        }
    }

    /// Claim the right to report if `interval` has passed since the last
    /// successful claim.
    fn try_acquire(&self, interval: Duration) -> bool {
        let now = u64::try_from(self.start.elapsed().as_nanos()).unwrap_or(u64::MAX - 1);
        let last = self.last_report.load(Ordering::Relaxed);
        if last != NEVER_REPORTED
            && u128::from(now.saturating_sub(last)) <= interval.as_nanos()
        {
            return false;
        }
        self.last_report
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for ReportThrottle {
    fn default() -> Self {
        Self::new()
    }
}
