//! Metrics definitions for the party service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `party_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `operation`: one value per coordinator operation
//! - `status`: `success` or an error code from `PartyError::error_code`
//! - `message_type`: one value per client envelope type, plus `invalid`
//! - `endpoint`: parameterized paths, unknown paths collapse to `/other`

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return its render handle.
///
/// # Errors
///
/// Fails when a global recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `party_http_requests_total`, `party_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);

    histogram!("party_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone()
    )
    .record(duration.as_secs_f64());

    counter!("party_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Replaces party ids in paths with a placeholder.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/ready" | "/metrics" | "/api/party" | "/api/movies/search" => {
            return path.to_string();
        }
        _ => {}
    }

    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match parts.as_slice() {
        ["api", "party", _] => "/api/party/{id}".to_string(),
        ["api", "party", _, "join"] => "/api/party/{id}/join".to_string(),
        ["api", "party", _, "start-nomination"] => "/api/party/{id}/start-nomination".to_string(),
        ["ws", "party", _] => "/ws/party/{id}".to_string(),
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Coordinator Metrics
// ============================================================================

/// Record a coordinator operation.
///
/// Metric: `party_operations_total`, `party_operation_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_operation(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("party_operation_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());

    counter!("party_operations_total", "operation" => operation, "status" => status).increment(1);
}

/// Record a failed lock acquisition.
///
/// Metric: `party_lock_contention_total`
/// Labels: `operation`
pub fn record_lock_contention(operation: &'static str) {
    counter!("party_lock_contention_total", "operation" => operation).increment(1);
}

/// Record a catalog round trip.
///
/// Metric: `party_catalog_request_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_catalog_request(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("party_catalog_request_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());
}

/// Record the number of counting rounds a tally took.
///
/// Metric: `party_tally_rounds`
pub fn record_tally_rounds(rounds: u32) {
    histogram!("party_tally_rounds").record(f64::from(rounds));
}

// ============================================================================
// Hub Metrics
// ============================================================================

/// Set the number of registered WebSocket connections.
///
/// Metric: `party_ws_connections_active`
#[allow(clippy::cast_precision_loss)]
pub fn set_active_connections(count: usize) {
    gauge!("party_ws_connections_active").set(count as f64);
}

/// Record an inbound WebSocket message.
///
/// Metric: `party_ws_messages_total`
/// Labels: `message_type`
pub fn record_ws_message(message_type: &'static str) {
    counter!("party_ws_messages_total", "message_type" => message_type).increment(1);
}

/// Record an outbound frame dropped because a connection's queue was full.
///
/// Metric: `party_ws_dropped_frames_total`
pub fn record_dropped_frame() {
    counter!("party_ws_dropped_frames_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These run against the global no-op recorder; they only check the
    // recording paths do not panic.

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, Duration::from_millis(1));
        record_http_request("POST", "/api/party/abc/join", 201, Duration::from_millis(20));
        record_http_request("GET", "/nope", 404, Duration::from_millis(1));
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/api/party"), "/api/party");
        assert_eq!(normalize_endpoint("/api/party/123"), "/api/party/{id}");
        assert_eq!(normalize_endpoint("/api/party/123/join"), "/api/party/{id}/join");
        assert_eq!(
            normalize_endpoint("/api/party/123/start-nomination"),
            "/api/party/{id}/start-nomination"
        );
        assert_eq!(normalize_endpoint("/ws/party/123"), "/ws/party/{id}");
        assert_eq!(normalize_endpoint("/api/party/1/2/3"), "/other");
    }

    #[test]
    fn test_record_coordinator_metrics() {
        record_operation("join_session", "success", Duration::from_millis(3));
        record_operation("join_session", "CONFLICT", Duration::from_millis(1));
        record_lock_contention("vote_nomination");
        record_catalog_request("get_movie_details", "success", Duration::from_millis(80));
        record_tally_rounds(2);
    }

    #[test]
    fn test_record_hub_metrics() {
        set_active_connections(3);
        record_ws_message("ping");
        record_dropped_frame();
    }
}
