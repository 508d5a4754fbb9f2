//! Cooperative cancellation of traverser threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, bounded};
use thiserror::Error;

/// Returned up the traversal stack once cancellation was observed.
///
/// This is how a worker unwinds; it is never reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

/// Cancellation signal for one worker thread.
///
/// Checked at every traversal entry point, and woken from blocking waits
/// through a channel that disconnects when the token is cancelled.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    sender: Mutex<Option<Sender<()>>>,
    wakeup: Receiver<()>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, wakeup) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                sender: Mutex::new(Some(sender)),
                wakeup,
            }),
        }
    }

    /// Raise the signal. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        // dropping the only sender disconnects `wakeup`
        self.inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Interruption point.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() { Err(Cancelled) } else { Ok(()) }
    }

    /// Becomes ready (disconnected) once the token is cancelled. Meant for
    /// `select!` next to the operation being waited on.
    pub fn wakeup(&self) -> &Receiver<()> {
        &self.inner.wakeup
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
