//! Shutdown trigger for callers that stop the server themselves.

use std::future::Future;

use crate::handler::{Canceller, Context};

/// Caller-held shutdown switch.
///
/// Hand [`Shutdown::wait`] to the server as its shutdown source and call
/// [`Shutdown::trigger`] to stop it. Triggering is sticky: a wait future
/// created after the trigger resolves immediately, and extra triggers are
/// ignored.
#[derive(Debug, Clone)]
pub struct Shutdown {
    trigger: Canceller,
    signal: Context,
}

impl Shutdown {
    /// Create a new shutdown switch.
    pub fn new() -> Self {
        let (trigger, signal) = Context::new();
        Self { trigger, signal }
    }

    /// Fire the shutdown event. Safe to call any number of times.
    pub fn trigger(&self) {
        self.trigger.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.trigger.is_cancelled()
    }

    /// Future resolving once the event fires.
    ///
    /// Also resolves if every `Shutdown` clone is dropped untriggered, since
    /// nothing could stop the server any more.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut signal = self.signal.clone();
        async move { signal.cancelled().await }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
