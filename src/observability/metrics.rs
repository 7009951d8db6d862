//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define runtime metrics (applies, validation errors, probes, health)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_config_applies_total` (counter): applies by result
//! - `proxy_config_errors_total` (counter): reported errors by code
//! - `proxy_health_probes_total` (counter): probes by cluster, outcome
//! - `proxy_destination_health` (gauge): 1=available, 0=not
//! - `proxy_active_probers` (gauge): clusters currently probed
//! - `proxy_endpoint_table_size` (gauge): published route endpoints
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_config_apply(success: bool) {
    let result = if success { "success" } else { "partial" };
    metrics::counter!("proxy_config_applies_total", "result" => result).increment(1);
}

pub fn record_config_error(code: &str) {
    metrics::counter!("proxy_config_errors_total", "code" => code.to_string()).increment(1);
}

pub fn record_probe(cluster_id: &str, outcome: &'static str) {
    metrics::counter!(
        "proxy_health_probes_total",
        "cluster" => cluster_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_destination_health(cluster_id: &str, destination_id: &str, available: bool) {
    metrics::gauge!(
        "proxy_destination_health",
        "cluster" => cluster_id.to_string(),
        "destination" => destination_id.to_string()
    )
    .set(if available { 1.0 } else { 0.0 });
}

pub fn record_active_probers(count: usize) {
    metrics::gauge!("proxy_active_probers").set(count as f64);
}

pub fn record_endpoint_table_size(size: usize) {
    metrics::gauge!("proxy_endpoint_table_size").set(size as f64);
}
