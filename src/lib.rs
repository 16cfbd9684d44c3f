//! Generic TCP server shell.
//!
//! Binds a listening socket, hands every accepted connection to a
//! [`Handler`], and shuts down in order: stop accepting, close the handler,
//! drain in-flight connections, return.

pub mod config;
pub mod handler;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServerConfig;
pub use handler::{Context, Handler};
pub use lifecycle::{listen_and_serve, listen_and_serve_with_signal, ServerError, Shutdown};
