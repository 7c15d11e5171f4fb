//! Mailbox messages for the `HubActor`.

use common::types::ConnectionId;
use tokio::sync::{mpsc, oneshot};

/// Sending half of one connection's outbound queue. Frames are serialized
/// JSON text.
pub type OutboundSender = mpsc::Sender<String>;

/// Messages handled by the `HubActor`.
#[derive(Debug)]
pub enum HubMessage {
    /// Add a connection to a party's registry. Replies with the party's
    /// connection count after registration.
    Register {
        party_id: String,
        connection_id: ConnectionId,
        outbound: OutboundSender,
        respond_to: oneshot::Sender<usize>,
    },

    /// Remove a connection. Unknown ids are ignored.
    Unregister {
        party_id: String,
        connection_id: ConnectionId,
    },

    /// Fan one serialized frame out to every connection of a party.
    /// Frames older than the last revision delivered are dropped.
    Broadcast {
        party_id: String,
        revision: u64,
        frame: String,
    },

    /// Number of connections registered for a party.
    ConnectionCount {
        party_id: String,
        respond_to: oneshot::Sender<usize>,
    },
}
