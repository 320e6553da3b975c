//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_connected_peers` (gauge): peers currently in the registry
//! - `relay_frames_total` (counter): frames by outcome
//!   (delivered, unreachable, timeout, failed, malformed)
//! - `relay_sessions_total` (counter): ended sessions by disconnect reason
//! - `relay_credentials_issued_total` (counter): credentials by kind
//! - `relay_auth_failures_total` (counter): rejected credentials by reason
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The Prometheus exporter is only installed when enabled in config

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connected_peers(count: usize) {
    metrics::gauge!("relay_connected_peers").set(count as f64);
}

pub fn record_frame(outcome: &'static str) {
    metrics::counter!("relay_frames_total", "outcome" => outcome).increment(1);
}

pub fn record_disconnect(reason: &'static str) {
    metrics::counter!("relay_sessions_total", "reason" => reason).increment(1);
}

pub fn record_credential_issued(kind: &'static str) {
    metrics::counter!("relay_credentials_issued_total", "kind" => kind).increment(1);
}

pub fn record_auth_failure(reason: &'static str) {
    metrics::counter!("relay_auth_failures_total", "reason" => reason).increment(1);
}
