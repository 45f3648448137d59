//! Metrics collection and exposition.
//!
//! # Metrics
//! - `listenloop_listeners_active` (gauge): live listeners, by transport
//! - `listenloop_listener_create_failures_total` (counter): failed creations, by transport
//! - `listenloop_connections_accepted_total` (counter)
//! - `listenloop_accept_errors_total` (counter): loop errors and failed accepts

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter, serving scrapes on `address`.
pub fn init(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(address).install()?;
    tracing::info!(%address, "Metrics endpoint listening");
    Ok(())
}

pub fn listener_opened(transport: &'static str) {
    ::metrics::gauge!("listenloop_listeners_active", "transport" => transport).increment(1.0);
}

pub fn listener_closed(transport: &'static str) {
    ::metrics::gauge!("listenloop_listeners_active", "transport" => transport).decrement(1.0);
}

pub fn listener_create_failed(transport: &'static str) {
    ::metrics::counter!("listenloop_listener_create_failures_total", "transport" => transport)
        .increment(1);
}

pub fn connection_accepted() {
    ::metrics::counter!("listenloop_connections_accepted_total").increment(1);
}

pub fn accept_error() {
    ::metrics::counter!("listenloop_accept_errors_total").increment(1);
}
