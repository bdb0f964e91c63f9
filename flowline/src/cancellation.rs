//! Cooperative cancellation for pipeline runs.
//!
//! The token is checked at step boundaries and awaited inside the engine's
//! suspension points (slot acquisition, backoff sleeps) so a pending wait
//! unblocks promptly instead of running out its full duration.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
    notify: Notify,
}

/// Token for signalling cancellation into a pipeline run.
///
/// Clones share state; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a new, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancel_with_reason("cancelled by caller");
    }

    /// Requests cancellation with a reason.
    pub fn cancel_with_reason(&self, reason: impl Into<String>) {
        {
            let mut guard = self.inner.reason.lock();
            if guard.is_none() {
                *guard = Some(reason.into());
            }
        }
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().clone()
    }

    /// Completes when cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register with the Notify before re-checking, so a cancel
            // racing with this call is never missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
