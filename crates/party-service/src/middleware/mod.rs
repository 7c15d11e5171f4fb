//! HTTP middleware for the party service.
//!
//! - `auth` - Bearer party token for host-only routes
//! - `http_metrics` - request metrics for every response

pub mod auth;
pub mod http_metrics;

pub use auth::require_party_token;
pub use http_metrics::http_metrics_middleware;
