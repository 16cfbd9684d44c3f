//! Shared utilities for lifecycle integration tests.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};

use tcp_server::handler::{Context, Handler};
use tcp_server::net::Accept;

/// Handler that records every phase of each invocation.
///
/// Each connection waits for cancellation, then keeps "working" for `hold`
/// before finishing, so drain ordering is observable.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub started: AtomicUsize,
    pub cancelled: AtomicUsize,
    pub finished: AtomicUsize,
    pub closes: AtomicUsize,
    hold: Duration,
}

#[allow(dead_code)]
impl RecordingHandler {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            ..Self::default()
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Wait until `n` invocations have started.
    pub async fn wait_started(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.started() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("handler invocations did not start in time");
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn handle(&self, mut ctx: Context, _conn: TcpStream, _peer: SocketAddr) {
        self.started.fetch_add(1, Ordering::SeqCst);
        ctx.cancelled().await;
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Accept source that fails its first `failures` accepts.
#[allow(dead_code)]
pub struct FlakyAccept {
    inner: TcpListener,
    failures: usize,
}

#[allow(dead_code)]
impl FlakyAccept {
    pub async fn bind(failures: usize) -> Self {
        Self {
            inner: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            failures,
        }
    }
}

#[async_trait]
impl Accept for FlakyAccept {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "injected accept failure"));
        }
        self.inner.accept().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// A loopback address that was free a moment ago.
#[allow(dead_code)]
pub fn free_address() -> String {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().to_string()
}

/// Connect, retrying while the server is still binding.
#[allow(dead_code)]
pub async fn connect(addr: &str) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(addr).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server at {addr} never accepted");
}
