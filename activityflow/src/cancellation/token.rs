//! Cancellation token for cooperative cancellation of activity invocations.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::warn;

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn Fn() + Send + Sync>;

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent - only the first cancellation reason is kept.
/// Async code can wait on [`CancellationToken::cancelled`]; child tokens
/// created with [`CancellationToken::child`] are cancelled with their parent.
#[derive(Default)]
pub struct CancellationToken {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<String>>,
    /// Callbacks to invoke on cancellation.
    callbacks: RwLock<Vec<CancelCallback>>,
    /// Child tokens, held weakly so finished children can be pruned.
    children: RwLock<Vec<Weak<CancellationToken>>>,
    /// Wakes tasks waiting in `cancelled()`.
    notify: Notify,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Callbacks are invoked immediately. Panics in callbacks are logged and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            *self.reason.write() = Some(reason.clone());
            self.notify.notify_waiters();

            let callbacks = std::mem::take(&mut *self.callbacks.write());
            for callback in &callbacks {
                run_callback(callback.as_ref());
            }

            let children = std::mem::take(&mut *self.children.write());
            for child in children.iter().filter_map(Weak::upgrade) {
                child.cancel(reason.clone());
            }
        }
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_cancelled() {
            run_callback(&callback);
            return;
        }
        self.callbacks.write().push(Box::new(callback));
        // cancel() may have drained the list between the check and the push
        if self.is_cancelled() {
            let late = std::mem::take(&mut *self.callbacks.write());
            for callback in &late {
                run_callback(callback.as_ref());
            }
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Waits until cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Creates a token that is cancelled whenever this one is.
    ///
    /// Cancelling the child does not affect the parent. The parent keeps
    /// only a weak reference; entries of dropped children are pruned on the
    /// next call.
    #[must_use]
    pub fn child(&self) -> Arc<Self> {
        let child = Arc::new(Self::new());
        {
            let mut children = self.children.write();
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        // cancel() may have drained the list before the push
        if self.is_cancelled() {
            let reason = self.reason().unwrap_or_else(|| "parent cancelled".to_string());
            child.cancel(reason);
            self.children.write().clear();
        }
        child
    }

    #[cfg(test)]
    pub(crate) fn child_slots(&self) -> usize {
        self.children.read().len()
    }
}

fn run_callback(callback: &(dyn Fn() + Send + Sync)) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        callback();
    })) {
        warn!("Cancellation callback panicked: {:?}", e);
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
