//! HTTP routes for the party service.
//!
//! Defines the Axum router and application state.

use crate::handlers;
use crate::hub::{HubHandle, HubSettings};
use crate::middleware::{http_metrics_middleware, require_party_token};
use crate::party::PartyCoordinator;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<PartyCoordinator>,

    /// Connection registry for this instance.
    pub hub: HubHandle,

    /// Applied to every upgraded connection.
    pub hub_settings: HubSettings,

    /// Cancelled when a shutdown signal arrives; readiness then reports 503.
    pub shutdown: CancellationToken,
}

/// Build the application routes.
///
/// - `/health`, `/ready` - liveness and readiness probes
/// - `/metrics` - Prometheus scrape endpoint
/// - `/api/party` - create, fetch and join parties
/// - `/api/party/:id/start-nomination` - host only, bearer token
/// - `/api/movies/search` - catalog search
/// - `/ws/party/:party_id` - WebSocket upgrade, token in query
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/party", post(handlers::create_party))
        .route("/api/party/:id", get(handlers::get_party))
        .route("/api/party/:id/join", post(handlers::join_party))
        .route("/api/movies/search", get(handlers::search_movies))
        .with_state(state.clone());

    // Upgraded connections outlive the request timeout, so the socket route
    // sits outside the timeout layer.
    let socket_routes = Router::new()
        .route("/ws/party/:party_id", get(handlers::party_socket))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route(
            "/api/party/:id/start-nomination",
            post(handlers::start_nomination),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_party_token,
        ))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    let http_routes = public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    http_routes
        .merge(socket_routes)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
