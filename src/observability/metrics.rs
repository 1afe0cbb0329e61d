//! Metrics collection and exposition.
//!
//! # Metrics
//! - `decoy_connections_total` (counter): accepted connections by port
//! - `decoy_bytes_received_total` (counter): payload bytes read by port
//! - `decoy_accept_errors_total` (counter): failed accepts by port
//! - `decoy_active_connections` (gauge): live connection slots
//! - `decoy_admission_available` (gauge): free admission tokens
//!
//! Recording is a no-op until an exporter is installed.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection(port: u16) {
    metrics::counter!("decoy_connections_total", "port" => port.to_string()).increment(1);
}

pub fn record_bytes_received(port: u16, bytes: usize) {
    metrics::counter!("decoy_bytes_received_total", "port" => port.to_string()).increment(bytes as u64);
}

pub fn record_accept_error(port: u16) {
    metrics::counter!("decoy_accept_errors_total", "port" => port.to_string()).increment(1);
}

pub fn set_active_connections(count: usize) {
    metrics::gauge!("decoy_active_connections").set(count as f64);
}

pub fn set_admission_available(count: usize) {
    metrics::gauge!("decoy_admission_available").set(count as f64);
}
