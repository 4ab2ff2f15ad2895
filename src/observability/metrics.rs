//! Metrics collection and exposition.
//!
//! # Metrics
//! - `finance_gate_rate_limited_total` (counter): rejected requests by policy
//! - `finance_gate_gate_failures_total` (counter): fail-open admissions by policy
//! - `finance_gate_sanitized_fields_total` (counter): rewritten request fields
//!   (`params`, `query`, `body`)
//! - `finance_gate_swept_entries_total` (counter): evicted rate limit entries
//! - `finance_gate_upstream_requests_total` (counter): forwarded requests by status
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!(
        "finance_gate_rate_limited_total",
        "Requests rejected with 429, by policy"
    );
    describe_counter!(
        "finance_gate_gate_failures_total",
        "Rate limit checks that failed and admitted the request"
    );
    describe_counter!(
        "finance_gate_sanitized_fields_total",
        "Request fields rewritten by the sanitizer"
    );
    describe_counter!(
        "finance_gate_swept_entries_total",
        "Expired rate limit entries evicted by the sweeper"
    );
    describe_counter!(
        "finance_gate_upstream_requests_total",
        "Requests forwarded upstream, by response status"
    );

    tracing::info!(address = %addr, "Prometheus metrics exporter started");
    Ok(())
}

pub fn record_rate_limited(policy: &str) {
    counter!(
        "finance_gate_rate_limited_total",
        "policy" => policy.to_string()
    )
    .increment(1);
}

pub fn record_gate_failure(policy: &str) {
    counter!(
        "finance_gate_gate_failures_total",
        "policy" => policy.to_string()
    )
    .increment(1);
}

pub fn record_sanitized(field: &'static str) {
    counter!("finance_gate_sanitized_fields_total", "field" => field).increment(1);
}

pub fn record_swept(removed: usize) {
    counter!("finance_gate_swept_entries_total").increment(removed as u64);
}

pub fn record_upstream(status: u16) {
    counter!(
        "finance_gate_upstream_requests_total",
        "status" => status.to_string()
    )
    .increment(1);
}
