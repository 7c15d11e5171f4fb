//! # Party Test Utilities
//!
//! Shared test utilities for the party service.
//!
//! This crate provides:
//! - Server test harness (`TestPartyServer` for E2E tests)
//! - HTTP and WebSocket client fixtures (`fixtures`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use party_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestPartyServer::spawn().await?;
//!     let created = create_party(&server, "Friday").await?;
//!
//!     let mut socket = WsClient::connect(&server.ws_url(&created.party_id, &created.auth_token)).await?;
//!     let update = socket.recv_json().await?;
//!     assert_eq!(update["type"], "party_update");
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
