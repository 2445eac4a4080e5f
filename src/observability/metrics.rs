//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): requests by method and status
//! - `gate_request_duration_seconds` (histogram): latency distribution
//! - `gate_csrf_rejected_total` (counter): cross-origin mutating requests refused
//! - `gate_rate_limited_total` (counter): rejections by rate-limit category
//! - `gate_rate_limit_windows` (gauge): live counter windows after a sweep
//! - `gate_authz_denied_total` (counter): schema/branch denials by check
//! - `gate_audit_dropped_total` (counter): audit events lost to a full queue or sink error
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - Prometheus exporter is opt-in via configuration

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gate_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gate_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_csrf_rejected() {
    counter!("gate_csrf_rejected_total").increment(1);
}

pub fn record_rate_limited(category: &'static str) {
    counter!("gate_rate_limited_total", "category" => category).increment(1);
}

pub fn record_rate_limit_windows(count: usize) {
    gauge!("gate_rate_limit_windows").set(count as f64);
}

pub fn record_authz_denied(check: &'static str) {
    counter!("gate_authz_denied_total", "check" => check).increment(1);
}

pub fn record_audit_dropped() {
    counter!("gate_audit_dropped_total").increment(1);
}
