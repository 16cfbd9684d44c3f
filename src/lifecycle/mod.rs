//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Register signals → Bind listener → Run accept loop
//!
//! Shutdown (shutdown.rs / signals.rs):
//!     Trigger or SIGHUP/SIGQUIT/SIGTERM/SIGINT → shutdown future resolves
//!     → Stop accepting → Close handler → Drain connections → Return
//! ```
//!
//! # Design Decisions
//! - The server only sees a future, never the signal machinery
//! - Ordered shutdown: flag, close listener, close handler, drain
//! - No drain deadline: handlers are trusted to stop once closed

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{SignalListener, TerminationSignal};
pub use startup::{listen_and_serve, listen_and_serve_with_signal, ServerError};
