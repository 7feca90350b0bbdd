//! Metric recording for client operations
//!
//! Emits through the `metrics` facade:
//!
//! - `ryde_api_requests_total` (counter): labels `method`, `status`
//! - `ryde_token_refreshes_total` (counter): label `outcome`
//!
//! The library installs no recorder; without one these calls are no-ops.
//! Embedders that want exposition install their own exporter.

/// Record a completed API request with method and status code labels.
pub(crate) fn record_request(method: &str, status: u16) {
    metrics::counter!(
        "ryde_api_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a finished refresh attempt with its outcome label.
pub(crate) fn record_refresh(outcome: &str) {
    metrics::counter!("ryde_token_refreshes_total", "outcome" => outcome.to_string())
        .increment(1);
}
