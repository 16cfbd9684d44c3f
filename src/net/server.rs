//! Accept loop and shutdown coordination.
//!
//! # Responsibilities
//! - Spawn one task per accepted connection
//! - Watch the shutdown source and tear down exactly once
//! - Tell expected accept failures (we closed the socket) from transport faults
//! - Drain in-flight connections before returning
//!
//! # State Machine
//! ```text
//! Listening ──shutdown──▶ ShuttingDown ──in-flight == 0──▶ Stopped
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::handler::{Canceller, Context, Handler};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Accept, Listener, ListenerCloser};
use crate::observability::metrics;

/// The once-only shutdown sequence shared by the watcher and the accept loop.
struct Teardown<H: ?Sized> {
    /// Set before the listener is closed; never reset.
    closing: AtomicBool,
    listener: ListenerCloser,
    handler: Arc<H>,
    cancel: Canceller,
}

impl<H: Handler + ?Sized> Teardown<H> {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Set the closing flag, close the listener, close the handler, cancel
    /// the connection context. Only the first call does anything.
    fn run(&self) -> bool {
        if self
            .closing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.listener.close();
        self.handler.close();
        self.cancel.cancel();
        true
    }
}

/// Runs the teardown and stops the watcher however `serve` is left, including
/// when its future is dropped mid-await.
struct ServeGuard<H: Handler + ?Sized> {
    teardown: Arc<Teardown<H>>,
    watcher: JoinHandle<()>,
}

impl<H: Handler + ?Sized> Drop for ServeGuard<H> {
    fn drop(&mut self) {
        // No-op after a normal shutdown.
        self.teardown.run();
        self.watcher.abort();
    }
}

/// Serve connections from `listener` until `shutdown` resolves.
///
/// Every accepted connection runs `handler.handle` on its own task; the loop
/// never waits for one before accepting the next. Once `shutdown` fires the
/// listener is closed, the handler is closed, the shared [`Context`] is
/// cancelled, and this returns after the last in-flight connection finishes.
///
/// Accept failures are never returned: while running they are logged and the
/// loop continues, during shutdown they end the loop.
pub async fn serve<A, H, S>(mut listener: Listener<A>, handler: Arc<H>, shutdown: S)
where
    A: Accept,
    H: Handler + ?Sized + 'static,
    S: Future<Output = ()> + Send + 'static,
{
    let (cancel, ctx) = Context::new();
    let tracker = ConnectionTracker::new();
    let teardown = Arc::new(Teardown {
        closing: AtomicBool::new(false),
        listener: listener.closer(),
        handler: Arc::clone(&handler),
        cancel,
    });

    let watcher = {
        let teardown = Arc::clone(&teardown);
        tokio::spawn(async move {
            shutdown.await;
            tracing::info!("Shutting down");
            teardown.run();
        })
    };
    let guard = ServeGuard { teardown, watcher };

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                metrics::record_accept();
                let conn = tracker.track();
                let span = tracing::info_span!(
                    "connection",
                    connection_id = %conn.id(),
                    peer_addr = %peer_addr
                );
                let handler = Arc::clone(&handler);
                let ctx = ctx.clone();

                tokio::spawn(
                    async move {
                        let _conn = conn;
                        tracing::debug!("Handling connection");
                        handler.handle(ctx, stream, peer_addr).await;
                    }
                    .instrument(span),
                );
            }
            Err(e) if guard.teardown.is_closing() => {
                tracing::debug!(error = %e, "Accept stopped by shutdown");
                break;
            }
            Err(e) => {
                metrics::record_accept_error();
                tracing::error!(error = %e, "Accept failed");
            }
        }
    }

    drop(listener);

    tracing::info!(in_flight = tracker.active_count(), "Waiting for connections to drain");
    tracker.wait_idle().await;

    drop(guard);
    tracing::info!("Server stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Mutex, OnceLock, Weak};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct CountingHandler {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn handle(&self, mut ctx: Context, _conn: TcpStream, _peer: SocketAddr) {
            ctx.cancelled().await;
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn teardown_runs_once() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let handler = Arc::new(CountingHandler::default());
        let (cancel, ctx) = Context::new();
        let teardown = Teardown {
            closing: AtomicBool::new(false),
            listener: listener.closer(),
            handler: Arc::clone(&handler),
            cancel,
        };

        assert!(!teardown.is_closing());
        assert!(teardown.run());
        assert!(!teardown.run());

        assert!(teardown.is_closing());
        assert!(listener.is_closed());
        assert!(ctx.is_cancelled());
        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);
    }

    /// Records what the teardown had already done when `close` ran.
    #[derive(Default)]
    struct OrderHandler {
        teardown: OnceLock<Weak<Teardown<OrderHandler>>>,
        seen: Mutex<Option<(bool, bool, bool)>>,
    }

    #[async_trait]
    impl Handler for OrderHandler {
        async fn handle(&self, _ctx: Context, _conn: TcpStream, _peer: SocketAddr) {}

        fn close(&self) {
            let teardown = self.teardown.get().and_then(Weak::upgrade).unwrap();
            *self.seen.lock().unwrap() = Some((
                teardown.is_closing(),
                teardown.listener.is_closed(),
                teardown.cancel.is_cancelled(),
            ));
        }
    }

    #[tokio::test]
    async fn teardown_closes_listener_before_handler_and_cancels_last() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let handler = Arc::new(OrderHandler::default());
        let (cancel, ctx) = Context::new();
        let teardown = Arc::new(Teardown {
            closing: AtomicBool::new(false),
            listener: listener.closer(),
            handler: Arc::clone(&handler),
            cancel,
        });
        handler.teardown.set(Arc::downgrade(&teardown)).unwrap();

        assert!(teardown.run());

        // closing set, listener closed, context not yet cancelled
        assert_eq!(*handler.seen.lock().unwrap(), Some((true, true, false)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_serve_future_still_tears_down() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = Arc::new(CountingHandler::default());

        let result = tokio::time::timeout(
            Duration::from_millis(100),
            serve(listener, Arc::clone(&handler), std::future::pending::<()>()),
        )
        .await;
        assert!(result.is_err());

        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);

        // The aborted watcher releases its handler reference.
        tokio::time::timeout(Duration::from_secs(1), async {
            while Arc::strong_count(&handler) > 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("watcher task kept the handler alive");

        // The socket was released with the future.
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn returns_after_shutdown_with_no_connections() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let handler = Arc::new(CountingHandler::default());
        let (tx, rx) = oneshot::channel::<()>();

        let server = tokio::spawn(serve(listener, Arc::clone(&handler), async move {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server should stop")
            .unwrap();
        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);
    }

    /// Fails every accept.
    struct BrokenAccept;

    #[async_trait]
    impl Accept for BrokenAccept {
        async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err(io::Error::new(io::ErrorKind::Other, "broken"))
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Err(io::Error::new(io::ErrorKind::NotConnected, "no socket"))
        }
    }

    #[tokio::test]
    async fn accept_errors_do_not_stop_the_loop() {
        let handler = Arc::new(CountingHandler::default());
        let (tx, rx) = oneshot::channel::<()>();

        let server = tokio::spawn(serve(Listener::new(BrokenAccept), Arc::clone(&handler), async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!server.is_finished());

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server should stop")
            .unwrap();
    }
}
