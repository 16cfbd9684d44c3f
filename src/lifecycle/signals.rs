//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGHUP, SIGQUIT, SIGTERM, SIGINT)
//! - Translate the first one received into a single shutdown event
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Fire-once: `recv` consumes the listener. Handlers stay installed
//!   afterwards, so repeated signals are absorbed instead of killing the
//!   process mid-drain
//! - Non-unix targets only observe Ctrl+C

use std::fmt;
use std::io;

/// Signal that requested termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Hangup,
    Quit,
    Terminate,
    Interrupt,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationSignal::Hangup => "SIGHUP",
            TerminationSignal::Quit => "SIGQUIT",
            TerminationSignal::Terminate => "SIGTERM",
            TerminationSignal::Interrupt => "SIGINT",
        };
        f.write_str(name)
    }
}

/// Registered interest in the termination signals.
#[cfg(unix)]
pub struct SignalListener {
    hangup: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    /// Install handlers for all termination signals.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            quit: signal(SignalKind::quit())?,
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for the first termination signal.
    pub async fn recv(mut self) -> TerminationSignal {
        tokio::select! {
            _ = self.hangup.recv() => TerminationSignal::Hangup,
            _ = self.quit.recv() => TerminationSignal::Quit,
            _ = self.terminate.recv() => TerminationSignal::Terminate,
            _ = self.interrupt.recv() => TerminationSignal::Interrupt,
        }
    }
}

/// Registered interest in the termination signals.
#[cfg(not(unix))]
#[derive(Debug)]
pub struct SignalListener {
    _private: (),
}

#[cfg(not(unix))]
impl SignalListener {
    pub fn register() -> io::Result<Self> {
        Ok(Self { _private: () })
    }

    /// Wait for Ctrl+C.
    pub async fn recv(self) -> TerminationSignal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        TerminationSignal::Interrupt
    }
}
