//! Connection handler subsystem.
//!
//! # Data Flow
//! ```text
//! net::server accept loop
//!     → one task per connection
//!     → Handler::handle(Context, TcpStream, peer)
//!
//! Shutdown teardown:
//!     → Handler::close() (once)
//!     → Context cancelled
//! ```
//!
//! # Design Decisions
//! - The server core knows nothing about the protocol; it only calls the trait
//! - Handler errors stay inside the handler; `handle` returns nothing
//! - `close` is synchronous: it signals, it does not wait

pub mod context;
pub mod echo;

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpStream;

pub use context::{Canceller, Context};
pub use echo::EchoHandler;

/// Protocol logic for accepted connections.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Serve one connection until it ends.
    ///
    /// Called once per accepted connection on its own task. Should return
    /// promptly after `ctx` is cancelled or [`Handler::close`] is called.
    async fn handle(&self, ctx: Context, conn: TcpStream, peer: SocketAddr);

    /// Make every outstanding `handle` call finish in bounded time.
    ///
    /// The server calls this once per run. Implementations should still
    /// tolerate repeated calls.
    fn close(&self);
}
