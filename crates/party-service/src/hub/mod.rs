//! Connection hub.
//!
//! Tracks live WebSocket connections per party, turns inbound envelopes into
//! coordinator calls and fans resulting state out to every connection of the
//! party. Each service instance has its own hub; there is no cross-instance
//! fan-out.

pub mod actor;
pub mod connection;
pub mod dispatch;
pub mod messages;
pub mod protocol;

pub use actor::HubHandle;
pub use connection::{run_connection, ConnectionIdentity, HubSettings};
pub use dispatch::{dispatch, DispatchOutcome};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
