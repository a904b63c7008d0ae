//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, WebSocket connections, frames)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by module, status
//! - `gateway_request_duration_seconds` (histogram): latency by module
//! - `gateway_websocket_connections` (gauge): live upgraded connections
//! - `gateway_websocket_frames_total` (counter): inbound frames by kind
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Unresolved requests are labelled `module="none"` to bound cardinality

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve it on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a completed HTTP request.
pub fn record_request(module: &str, status: u16, start: Instant) {
    let module = module.to_string();
    metrics::counter!(
        "gateway_requests_total",
        "module" => module.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "module" => module)
        .record(start.elapsed().as_secs_f64());
}

/// Publish the number of live WebSocket connections.
pub fn record_websocket_connections(count: u64) {
    metrics::gauge!("gateway_websocket_connections").set(count as f64);
}

/// Count one inbound WebSocket frame.
pub fn record_websocket_frame(kind: &'static str) {
    metrics::counter!("gateway_websocket_frames_total", "kind" => kind).increment(1);
}
