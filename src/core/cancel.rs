//! One-directional cancellation sources and the per-job cancellation context.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// A one-directional cancellation flag.
///
/// Once triggered it stays triggered; there is no way to rescind. The
/// scheduler's global abort signal is a `CancelSource`, and callers may supply
/// their own as an additional per-job source.
#[derive(Debug, Default)]
pub struct CancelSource {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelSource {
    /// Create an untriggered source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the source, waking every waiter. Idempotent.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether the source has been triggered.
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Resolves once the source is triggered. Returns immediately if it
    /// already was.
    pub async fn triggered(&self) {
        loop {
            if self.is_triggered() {
                return;
            }
            // Register with the Notify before the re-check so a trigger
            // between check and await cannot be missed.
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// The effective cancellation signal of one job.
///
/// A job is cancelled when any of three sources triggers: the scheduler's
/// global abort signal, an optional caller-supplied source, or the job's own
/// source (set by [`Job::cancel`](crate::core::Job::cancel)). Propagation is an
/// explicit check via [`is_cancelled`](Self::is_cancelled) at the defined
/// checkpoints; running work is never preempted.
#[derive(Debug, Clone)]
pub struct CancelContext {
    global: Arc<CancelSource>,
    local: Option<Arc<CancelSource>>,
    own: Arc<CancelSource>,
}

impl CancelContext {
    /// Context observing only the scheduler's global abort signal.
    #[must_use]
    pub fn new(global: Arc<CancelSource>) -> Self {
        Self {
            global,
            local: None,
            own: Arc::new(CancelSource::new()),
        }
    }

    /// Context observing the global abort signal and an additional
    /// caller-supplied source.
    #[must_use]
    pub fn with_local(global: Arc<CancelSource>, local: Arc<CancelSource>) -> Self {
        Self {
            global,
            local: Some(local),
            own: Arc::new(CancelSource::new()),
        }
    }

    /// Whether any source has triggered.
    pub fn is_cancelled(&self) -> bool {
        self.global.is_triggered()
            || self.own.is_triggered()
            || self.local.as_ref().is_some_and(|src| src.is_triggered())
    }

    /// Resolves once any source triggers.
    pub async fn cancelled(&self) {
        tokio::select! {
            () = self.global.triggered() => {}
            () = self.own.triggered() => {}
            () = Self::local_triggered(self.local.as_deref()) => {}
        }
    }

    pub(crate) fn trigger_own(&self) {
        self.own.trigger();
    }

    async fn local_triggered(local: Option<&CancelSource>) {
        match local {
            Some(src) => src.triggered().await,
            None => std::future::pending().await,
        }
    }
}
