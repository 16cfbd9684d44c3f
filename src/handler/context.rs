//! Cancellation context shared by every connection of a server run.

use std::sync::Arc;
use tokio::sync::watch;

/// Read side of a cancellation signal, handed to each handler invocation.
///
/// Cheap to clone. Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct Context {
    rx: watch::Receiver<bool>,
}

impl Context {
    /// Create a context and the handle that cancels it.
    pub fn new() -> (Canceller, Context) {
        let (tx, rx) = watch::channel(false);
        (Canceller { tx: Arc::new(tx) }, Context { rx })
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    ///
    /// Also resolves if every [`Canceller`] is dropped, since nothing can
    /// cancel the context any more and the owning server is gone.
    pub async fn cancelled(&mut self) {
        loop {
            let cancelled = *self.rx.borrow_and_update();
            if cancelled {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Write side of a [`Context`].
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

impl Canceller {
    /// Cancel every context derived from this handle. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}
