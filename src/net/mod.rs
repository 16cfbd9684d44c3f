//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, closable accept)
//!     → server.rs (accept loop, one task per connection)
//!     → connection.rs (in-flight tracking for drain)
//!     → Hand off to the Handler
//!
//! Server States:
//!     Created → Listening → ShuttingDown → Stopped
//! ```
//!
//! # Design Decisions
//! - No admission control: every accepted connection gets a task
//! - Each connection tracked so shutdown can drain it
//! - Accept errors only end the loop once shutdown has begun

pub mod connection;
pub mod listener;
pub mod server;

pub use listener::{Accept, Listener, ListenerCloser, ListenerError};
pub use server::serve;
