//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound requests by method, status
//! - `gateway_request_duration_seconds` (histogram): time to answer the client
//! - `gateway_delegated_total` (counter): requests published per microservice
//! - `gateway_replies_total` (counter): replies by microservice, outcome
//! - `gateway_pending_calls` (gauge): delegated calls awaiting a reply
//! - `gateway_pending_timeouts_total` (counter): calls evicted by the sweeper

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_delegated(microservice: &str) {
    metrics::counter!("gateway_delegated_total", "microservice" => microservice.to_string())
        .increment(1);
}

/// `outcome` is one of `completed`, `orphaned`, `malformed`.
pub fn record_reply(microservice: &str, outcome: &'static str) {
    metrics::counter!(
        "gateway_replies_total",
        "microservice" => microservice.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn set_pending_calls(count: usize) {
    metrics::gauge!("gateway_pending_calls").set(count as f64);
}

pub fn record_pending_timeout(microservice: &str) {
    metrics::counter!("gateway_pending_timeouts_total", "microservice" => microservice.to_string())
        .increment(1);
}
