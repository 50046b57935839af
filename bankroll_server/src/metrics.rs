//! Prometheus metrics for monitoring ledger health and enforcement.
//!
//! Metrics are exposed in Prometheus text format on a dedicated
//! listener configured via `METRICS_BIND`.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a successfully applied ledger operation.
pub fn operations_applied_total(kind: &str) {
    metrics::counter!("operations_applied_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record an idempotent replay of an already-applied operation.
pub fn operations_replayed_total(kind: &str) {
    metrics::counter!("operations_replayed_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a responsible-gambling rejection.
pub fn guard_rejections_total(reason: &str) {
    metrics::counter!("guard_rejections_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a balance-lock acquisition timeout.
pub fn lock_timeouts_total() {
    metrics::counter!("lock_timeouts_total").increment(1);
}

/// Increment rate limit hits counter.
pub fn rate_limit_hits_total(endpoint: &str) {
    metrics::counter!("rate_limit_hits_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}
