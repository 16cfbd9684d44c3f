//! Closable TCP listener.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Let another task close the listener, failing any pending or later accept
//!
//! # Design Decisions
//! - Closing is a watch broadcast, so an accept that starts after the close
//!   still observes it
//! - The accept source is a trait so tests can inject transport faults

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    /// Failed to accept connection.
    #[error("failed to accept: {0}")]
    Accept(#[source] io::Error),
    /// The listener was closed.
    #[error("listener closed")]
    Closed,
}

/// Source of accepted connections.
#[async_trait]
pub trait Accept: Send {
    /// Wait for the next inbound connection.
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)>;

    /// Address the source is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Accept for TcpListener {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// A listener that can be closed from another task.
///
/// Dropping the listener releases the underlying socket.
pub struct Listener<A = TcpListener> {
    inner: A,
    closed: watch::Receiver<bool>,
    closer: ListenerCloser,
}

impl Listener<TcpListener> {
    /// Bind a TCP listener at `address` (host:port, resolved by the OS).
    pub async fn bind(address: &str) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ListenerError::Bind {
                address: address.to_string(),
                source,
            })?;

        Ok(Self::new(listener))
    }
}

impl<A: Accept> Listener<A> {
    /// Wrap an already bound accept source.
    pub fn new(inner: A) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            inner,
            closed: rx,
            closer: ListenerCloser { tx: Arc::new(tx) },
        }
    }

    /// Accept the next connection.
    ///
    /// Fails with [`ListenerError::Closed`] once the listener is closed, even
    /// if the accept was already pending.
    pub async fn accept(&mut self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        if *self.closed.borrow() {
            return Err(ListenerError::Closed);
        }

        let closed = &mut self.closed;
        let inner = &mut self.inner;

        let (stream, addr) = tokio::select! {
            biased;

            _ = wait_closed(closed) => return Err(ListenerError::Closed),
            result = inner.accept() => result.map_err(ListenerError::Accept)?,
        };

        tracing::debug!(peer_addr = %addr, "Connection accepted");
        Ok((stream, addr))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.inner.local_addr()
    }

    /// Handle that closes this listener from another task.
    pub fn closer(&self) -> ListenerCloser {
        self.closer.clone()
    }

    /// Whether the listener has been closed.
    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }
}

async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    loop {
        let closed = *rx.borrow_and_update();
        if closed {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Closes a [`Listener`]. Cloneable and idempotent.
#[derive(Debug, Clone)]
pub struct ListenerCloser {
    tx: Arc<watch::Sender<bool>>,
}

impl ListenerCloser {
    /// Close the listener. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Whether the listener has been closed.
    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}
