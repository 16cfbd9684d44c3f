//! Line echo handler.
//!
//! Writes every newline-terminated line back to the client. Used by the
//! `tcp-server` binary and as a reference [`Handler`] implementation.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::config::ServerConfig;
use crate::handler::{Canceller, Context, Handler};

/// Longest line echoed back, newline included. Longer lines drop the client.
pub const MAX_LINE_LEN: u64 = 64 * 1024;

/// Echoes lines back to clients until they disconnect or the handler closes.
#[derive(Debug)]
pub struct EchoHandler {
    active: DashSet<SocketAddr>,
    closing: Canceller,
    closed: Context,
    idle_timeout: Option<Duration>,
}

impl EchoHandler {
    /// Create a handler. Connections idle longer than `idle_timeout` are dropped.
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        let (closing, closed) = Context::new();
        Self {
            active: DashSet::new(),
            closing,
            closed,
            idle_timeout,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.idle_timeout())
    }

    /// Number of clients currently being served.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    async fn echo(&self, ctx: &mut Context, conn: TcpStream) -> io::Result<()> {
        let mut closed = self.closed.clone();
        let (reader, mut writer) = conn.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();

        loop {
            // Read and write back one line; both halves stay cancellable so a
            // client that stops reading cannot pin the task in `write_all`.
            let step = async {
                line.clear();
                let limited = (&mut reader).take(MAX_LINE_LEN);
                let n = with_idle_timeout(self.idle_timeout, read_line(limited, &mut line)).await?;
                if n as u64 == MAX_LINE_LEN && line.last() != Some(&b'\n') {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
                }
                if n > 0 {
                    writer.write_all(&line).await?;
                }
                Ok::<usize, io::Error>(n)
            };

            let n = tokio::select! {
                _ = closed.cancelled() => return Ok(()),
                _ = ctx.cancelled() => return Ok(()),
                n = step => n?,
            };

            if n == 0 {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, mut ctx: Context, conn: TcpStream, peer: SocketAddr) {
        if self.is_closing() {
            tracing::debug!("Handler closing, refusing connection");
            return;
        }

        self.active.insert(peer);

        match self.echo(&mut ctx, conn).await {
            Ok(()) => tracing::debug!("Client disconnected"),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                tracing::info!("Idle timeout, closing connection")
            }
            Err(e) => tracing::warn!(error = %e, "Connection error"),
        }

        self.active.remove(&peer);
    }

    fn close(&self) {
        if self.is_closing() {
            return;
        }
        tracing::info!(active = self.active.len(), "Echo handler shutting down");
        self.closing.cancel();
    }
}

async fn read_line<R>(mut reader: R, line: &mut Vec<u8>) -> io::Result<usize>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    reader.read_until(b'\n', line).await
}

async fn with_idle_timeout<F>(limit: Option<Duration>, read: F) -> io::Result<usize>
where
    F: std::future::Future<Output = io::Result<usize>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, read)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "idle timeout"))?,
        None => read.await,
    }
}
