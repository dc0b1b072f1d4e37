//! Request-scoped cancellation
//!
//! Every provider and data source call receives a [`Context`]. The gRPC server
//! hands out clones of one root context that is cancelled by `StopProvider`,
//! optionally wrapped with a per-request deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;

/// Context carries cancellation and deadline information across async boundaries.
/// Pass it as the first parameter to all async trait methods.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    deadline: Option<Instant>,
    done_tx: watch::Sender<bool>,
    done: watch::Receiver<bool>,
}

impl Context {
    pub fn new() -> Self {
        Self::with_deadline(None)
    }

    fn with_deadline(deadline: Option<Instant>) -> Self {
        let (done_tx, done) = watch::channel(false);
        Self {
            inner: Arc::new(ContextInner {
                deadline,
                done_tx,
                done,
            }),
        }
    }

    /// Derive a child context that is cancelled when `timeout` elapses or
    /// when this context is cancelled, whichever comes first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let deadline = match self.inner.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };

        let child = Self::with_deadline(Some(deadline));
        let parent_done = self.done();
        let mut child_done = child.done();
        let watcher = Arc::downgrade(&child.inner);

        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep_until(deadline.into()) => {}
                _ = wait_for_cancel(parent_done) => {}
                // cancelled directly, or every clone dropped
                _ = child_done.changed() => return,
            }
            if let Some(inner) = watcher.upgrade() {
                let _ = inner.done_tx.send(true);
            }
        });

        child
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.done.borrow()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Returns a receiver that flips to `true` once work done on behalf of
    /// this context should stop
    pub fn done(&self) -> watch::Receiver<bool> {
        self.inner.done.clone()
    }

    /// Resolves once the context is cancelled
    pub async fn cancelled(&self) {
        wait_for_cancel(self.done()).await
    }

    pub fn cancel(&self) {
        let _ = self.inner.done_tx.send(true);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_cancel(mut done: watch::Receiver<bool>) {
    loop {
        if *done.borrow_and_update() {
            return;
        }
        if done.changed().await.is_err() {
            // sender gone without cancelling: never resolves
            std::future::pending::<()>().await;
        }
    }
}
