//! HTTP request handlers for the party service.

pub mod health;
pub mod metrics;
pub mod movies;
pub mod party;
pub mod ws;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use movies::search_movies;
pub use party::{create_party, get_party, join_party, start_nomination};
pub use ws::party_socket;
