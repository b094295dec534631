//! Metrics collection and exposition.
//!
//! # Metrics
//! - `user_service_http_requests_total` (counter): REST requests by method, status
//! - `user_service_http_request_duration_seconds` (histogram): REST latency
//! - `user_service_rpc_calls_total` (counter): RPC calls by method, code
//! - `user_service_rpc_call_duration_seconds` (histogram): RPC latency
//! - `user_service_users_stored` (gauge): current number of users
//! - `user_service_drain_total` (counter): listener drain results by outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_http_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("user_service_http_requests_total", &labels).increment(1);
    histogram!("user_service_http_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rpc_call(method: &'static str, code: &'static str, start: Instant) {
    counter!("user_service_rpc_calls_total", "method" => method, "code" => code).increment(1);
    histogram!("user_service_rpc_call_duration_seconds", "method" => method)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_users_stored(count: usize) {
    gauge!("user_service_users_stored").set(count as f64);
}

pub fn record_drain(listener: &'static str, outcome: &'static str) {
    counter!("user_service_drain_total", "listener" => listener, "outcome" => outcome)
        .increment(1);
}
