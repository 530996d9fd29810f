//! Cooperative shutdown signalling for workers and background tasks.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A shared shutdown signal.
///
/// Triggering is idempotent; only the first reason is kept. Workers poll
/// [`ShutdownToken::is_triggered`] between state-machine steps, and
/// background tasks can `await` [`ShutdownToken::wait`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    triggered: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

impl ShutdownToken {
    /// Creates a new, un-triggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown with a reason. First reason wins.
    pub fn trigger(&self, reason: impl Into<String>) {
        if self
            .inner
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.inner.reason.write() = Some(reason.into());
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns whether shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Returns the shutdown reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Waits until shutdown is requested.
    pub async fn wait(&self) {
        if self.is_triggered() {
            return;
        }
        let notified = self.inner.notify.notified();
        // Re-check after registering, so a trigger between the first check
        // and registration is not lost.
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}
