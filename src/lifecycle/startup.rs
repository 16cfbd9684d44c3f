//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the listener at the configured address
//! - Wire the shutdown source (caller future or OS signals) into the server
//! - Surface the only fatal errors: bind and signal registration
//!
//! # Design Decisions
//! - Fail fast: a bind error is returned at once, never retried
//! - Signals are registered before binding so an early SIGTERM is not lost

use std::future::Future;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::config::ServerConfig;
use crate::handler::Handler;
use crate::lifecycle::signals::SignalListener;
use crate::net::listener::{Listener, ListenerError};
use crate::net::server::serve;

/// Fatal server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("failed to register signal handlers: {0}")]
    Signal(#[source] io::Error),
}

/// Bind `config.address` and serve until `shutdown` resolves.
///
/// Returns `Ok(())` once every accepted connection has finished. The handler
/// is closed exactly once on every path out, including a failed bind.
pub async fn listen_and_serve<H, S>(
    config: &ServerConfig,
    handler: Arc<H>,
    shutdown: S,
) -> Result<(), ServerError>
where
    H: Handler + ?Sized + 'static,
    S: Future<Output = ()> + Send + 'static,
{
    let listener = match Listener::bind(&config.address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %config.address, error = %e, "Bind failed");
            handler.close();
            return Err(e.into());
        }
    };

    let address = listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| config.address.clone());
    tracing::info!(
        %address,
        max_connect = config.max_connect,
        timeout_secs = config.timeout_secs,
        "Listening"
    );

    serve(listener, handler, shutdown).await;
    Ok(())
}

/// Like [`listen_and_serve`], stopping on SIGHUP, SIGQUIT, SIGTERM or SIGINT.
pub async fn listen_and_serve_with_signal<H>(
    config: &ServerConfig,
    handler: Arc<H>,
) -> Result<(), ServerError>
where
    H: Handler + ?Sized + 'static,
{
    let signals = SignalListener::register().map_err(ServerError::Signal)?;

    listen_and_serve(config, handler, async move {
        let signal = signals.recv().await;
        tracing::info!(%signal, "Termination signal received");
    })
    .await
}
