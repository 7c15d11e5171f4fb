//! Party Service Library
//!
//! Core of the watch-party coordinator: small groups create a party, join it
//! by name, nominate movies with yay/nay votes, rank the accepted pool and
//! get a single winner by instant-runoff.
//!
//! # Architecture
//!
//! The service is stateless. Every party lives in Redis and every mutation
//! runs under a per-party distributed lock, so any instance can serve any
//! request.
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs ----\
//!                                     +-> party::PartyCoordinator -> store/*.rs
//! hub/connection.rs -> hub/dispatch -/                            -> catalog/*.rs
//! ```
//!
//! # Modules
//!
//! - `catalog` - Movie catalog trait, TMDB client and mock
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `hub` - WebSocket connection registry and wire protocol
//! - `middleware` - Bearer token and HTTP metrics middleware
//! - `models` - Party state and API models
//! - `observability` - Prometheus metrics
//! - `party` - Coordinator, token authority and tally engine
//! - `routes` - Axum router setup
//! - `store` - Session store, lock and token persistence

pub mod catalog;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod hub;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod party;
pub mod routes;
pub mod store;
