//! `HubActor` - per-instance registry of live connections.
//!
//! The actor owns the `party id -> connections` map outright; every register,
//! unregister and broadcast arrives through its mailbox, so the registry needs
//! no locking.
//!
//! # Backpressure
//!
//! Each connection has a bounded outbound queue. A broadcast that finds the
//! queue full drops that one frame for that connection; the next
//! `party_update` carries the full state and resynchronizes it. A closed queue
//! means the connection's write task is gone, and the connection is removed.
//!
//! # Ordering
//!
//! Broadcasts are sent after the party lock is released, so two back-to-back
//! writes can reach the mailbox in reverse order. The actor remembers the
//! highest revision it has delivered per party and drops any older frame.
//! Equal revisions still go out: an unchanged party is re-sent as the reply
//! to an ignored action.
//!
//! # Shutdown
//!
//! Cancelling the hub clears the registry. Dropping the outbound senders ends
//! every connection's write task.

use super::messages::{HubMessage, OutboundSender};
use super::protocol::ServerMessage;
use crate::errors::PartyError;
use crate::models::Party;
use crate::observability::metrics;
use common::types::ConnectionId;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default channel buffer size for the hub mailbox.
const HUB_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `HubActor`.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubMessage>,
    cancel_token: CancellationToken,
}

impl HubHandle {
    /// Spawns the hub actor and returns a handle to it.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(HUB_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = HubActor {
            receiver,
            cancel_token: cancel_token.clone(),
            parties: HashMap::new(),
            revisions: HashMap::new(),
        };
        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Registers a connection and returns the party's connection count.
    pub async fn register(
        &self,
        party_id: &str,
        connection_id: ConnectionId,
        outbound: OutboundSender,
    ) -> Result<usize, PartyError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(HubMessage::Register {
                party_id: party_id.to_string(),
                connection_id,
                outbound,
                respond_to: tx,
            })
            .await
            .map_err(|e| PartyError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PartyError::Internal(format!("response receive failed: {e}")))
    }

    /// Removes a connection. A stopped hub has nothing left to remove, so
    /// send failures are only logged.
    pub async fn unregister(&self, party_id: &str, connection_id: ConnectionId) {
        let message = HubMessage::Unregister {
            party_id: party_id.to_string(),
            connection_id,
        };
        if self.sender.send(message).await.is_err() {
            debug!(target: "party.hub", %connection_id, "Hub stopped before unregister");
        }
    }

    /// Broadcasts the full party state as a `party_update`.
    pub async fn broadcast(&self, party: &Party) -> Result<(), PartyError> {
        let frame = ServerMessage::PartyUpdate {
            party: party.clone(),
        }
        .to_json()?;

        self.sender
            .send(HubMessage::Broadcast {
                party_id: party.id.clone(),
                revision: party.revision,
                frame,
            })
            .await
            .map_err(|e| PartyError::Internal(format!("channel send failed: {e}")))
    }

    /// Number of live connections for a party.
    pub async fn connection_count(&self, party_id: &str) -> Result<usize, PartyError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(HubMessage::ConnectionCount {
                party_id: party_id.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|e| PartyError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PartyError::Internal(format!("response receive failed: {e}")))
    }

    /// Token for connection tasks; cancelled when the hub shuts down.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

impl Default for HubHandle {
    fn default() -> Self {
        Self::new()
    }
}

struct HubActor {
    receiver: mpsc::Receiver<HubMessage>,
    cancel_token: CancellationToken,
    parties: HashMap<String, HashMap<ConnectionId, OutboundSender>>,
    /// Highest revision broadcast per party with live connections.
    revisions: HashMap<String, u64>,
}

impl HubActor {
    async fn run(mut self) {
        info!(target: "party.hub", "Hub started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "party.hub",
                        connections = self.total_connections(),
                        "Hub received cancellation signal"
                    );
                    break;
                }
                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!(target: "party.hub", "Hub channel closed");
                            break;
                        }
                    }
                }
            }
        }

        self.parties.clear();
        self.revisions.clear();
        metrics::set_active_connections(0);
        info!(target: "party.hub", "Hub stopped");
    }

    fn handle_message(&mut self, message: HubMessage) {
        match message {
            HubMessage::Register {
                party_id,
                connection_id,
                outbound,
                respond_to,
            } => {
                let connections = self.parties.entry(party_id.clone()).or_default();
                connections.insert(connection_id, outbound);
                let count = connections.len();
                debug!(
                    target: "party.hub",
                    party_id = %party_id,
                    %connection_id,
                    party_connections = count,
                    "Connection registered"
                );
                self.publish_gauge();
                let _ = respond_to.send(count);
            }

            HubMessage::Unregister {
                party_id,
                connection_id,
            } => {
                if self.remove(&party_id, connection_id) {
                    debug!(
                        target: "party.hub",
                        party_id = %party_id,
                        %connection_id,
                        "Connection unregistered"
                    );
                    self.publish_gauge();
                }
            }

            HubMessage::Broadcast {
                party_id,
                revision,
                frame,
            } => self.broadcast(&party_id, revision, &frame),

            HubMessage::ConnectionCount {
                party_id,
                respond_to,
            } => {
                let count = self.parties.get(&party_id).map_or(0, HashMap::len);
                let _ = respond_to.send(count);
            }
        }
    }

    fn broadcast(&mut self, party_id: &str, revision: u64, frame: &str) {
        let Some(connections) = self.parties.get(party_id) else {
            return;
        };

        let delivered_revision = self.revisions.entry(party_id.to_string()).or_default();
        if revision < *delivered_revision {
            debug!(
                target: "party.hub",
                party_id = %party_id,
                revision,
                delivered = *delivered_revision,
                "Dropping stale party update"
            );
            return;
        }
        *delivered_revision = revision;

        let mut closed = Vec::new();
        for (connection_id, outbound) in connections {
            match outbound.try_send(frame.to_string()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        target: "party.hub",
                        party_id = %party_id,
                        connection_id = %connection_id,
                        "Outbound queue full, dropping frame"
                    );
                    metrics::record_dropped_frame();
                }
                Err(TrySendError::Closed(_)) => closed.push(*connection_id),
            }
        }

        let delivered = connections.len() - closed.len();
        for connection_id in closed {
            debug!(
                target: "party.hub",
                party_id = %party_id,
                %connection_id,
                "Outbound queue closed, removing connection"
            );
            self.remove(party_id, connection_id);
        }
        self.publish_gauge();

        debug!(target: "party.hub", party_id = %party_id, delivered, "Broadcast sent");
    }

    /// Returns whether the connection was registered.
    fn remove(&mut self, party_id: &str, connection_id: ConnectionId) -> bool {
        let Some(connections) = self.parties.get_mut(party_id) else {
            return false;
        };
        let removed = connections.remove(&connection_id).is_some();
        if connections.is_empty() {
            self.parties.remove(party_id);
            self.revisions.remove(party_id);
        }
        removed
    }

    fn total_connections(&self) -> usize {
        self.parties.values().map(HashMap::len).sum()
    }

    fn publish_gauge(&self) {
        metrics::set_active_connections(self.total_connections());
    }
}
