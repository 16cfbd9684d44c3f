//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tcp_connections_accepted_total` (counter): accepted connections
//! - `tcp_accept_errors_total` (counter): unexpected accept failures
//! - `tcp_connections_in_flight` (gauge): handler invocations running
//!
//! Recording is always on and costs nothing without an installed recorder;
//! the Prometheus endpoint is only started when configured.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve it over HTTP at `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_accept() {
    counter!("tcp_connections_accepted_total").increment(1);
}

pub fn record_accept_error() {
    counter!("tcp_accept_errors_total").increment(1);
}

pub fn connection_opened() {
    gauge!("tcp_connections_in_flight").increment(1.0);
}

pub fn connection_closed() {
    gauge!("tcp_connections_in_flight").decrement(1.0);
}
