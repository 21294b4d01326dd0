//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_queries_total` (counter): queries by method and outcome
//! - `gateway_active_connections` (gauge): registered client connections
//! - `worker_commands_total` (counter): dispatched backend commands
//! - `worker_heartbeats_total` (counter): published heartbeat frames

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener. Failure is logged,
/// never fatal; the gateway runs fine without metrics.
pub fn init_metrics(address: SocketAddr) {
    match PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
    {
        Ok(()) => tracing::info!(address = %address, "Metrics exporter listening"),
        Err(error) => tracing::error!(error = %error, "Failed to install metrics exporter"),
    }
}

pub fn record_query(method: &str, outcome: &'static str) {
    counter!(
        "gateway_queries_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_command(command: &str) {
    counter!("worker_commands_total", "command" => command.to_string()).increment(1);
}

pub fn record_heartbeat() {
    counter!("worker_heartbeats_total").increment(1);
}

pub fn connection_opened() {
    gauge!("gateway_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("gateway_active_connections").decrement(1.0);
}
