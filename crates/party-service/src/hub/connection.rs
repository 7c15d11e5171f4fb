//! One live WebSocket connection.
//!
//! Each connection runs two tasks sharing a `CancellationToken`:
//!
//! - the write task drains the bounded outbound queue into the socket and
//!   sends a WebSocket ping every `ping_interval`
//! - the read task parses inbound frames, dispatches them and enforces the
//!   read deadline
//!
//! Whichever task stops first cancels the other. The connection is then
//! unregistered from the hub. Closing a connection never touches the party's
//! participant list.

use super::actor::HubHandle;
use super::dispatch::{dispatch, DispatchOutcome};
use super::messages::OutboundSender;
use super::protocol::{ClientMessage, ServerMessage};
use crate::observability::metrics;
use crate::party::PartyCoordinator;
use axum::extract::ws::{Message, WebSocket};
use common::types::ConnectionId;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default WebSocket ping interval. Must stay below the read timeout.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(54);

/// Default read deadline; any inbound frame resets it.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum inbound message size.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4096;

/// Default per-connection outbound queue depth.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Per-connection tuning.
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub ping_interval: Duration,
    pub read_timeout: Duration,
    pub max_message_bytes: usize,
    pub outbound_buffer: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

/// Identity bound to a connection at upgrade time.
#[derive(Debug, Clone)]
pub struct ConnectionIdentity {
    pub party_id: String,
    pub user_id: String,
}

/// Serves an upgraded socket until either side closes it.
#[instrument(
    skip_all,
    fields(party_id = %identity.party_id, user_id = %identity.user_id)
)]
pub async fn run_connection(
    socket: WebSocket,
    identity: ConnectionIdentity,
    hub: HubHandle,
    coordinator: Arc<PartyCoordinator>,
    settings: HubSettings,
) {
    let connection_id = ConnectionId::new();
    let (outbound, outbound_rx) = mpsc::channel(settings.outbound_buffer.max(1));

    if let Err(e) = hub
        .register(&identity.party_id, connection_id, outbound.clone())
        .await
    {
        warn!(target: "party.hub", error = %e, "Failed to register connection");
        return;
    }
    info!(target: "party.hub", %connection_id, "Connection opened");

    // Initial sync so the client does not wait for the next change.
    match coordinator.get_session(&identity.party_id).await {
        Ok(party) => enqueue(&outbound, connection_id, &ServerMessage::PartyUpdate { party }),
        Err(e) => {
            e.log_if_internal();
            enqueue(&outbound, connection_id, &ServerMessage::error(e.client_message()));
        }
    }

    let cancel_token = hub.child_token();
    let (sink, stream) = socket.split();

    let writer = tokio::spawn(write_loop(
        sink,
        outbound_rx,
        settings.ping_interval,
        cancel_token.clone(),
    ));

    let reader = Reader {
        identity: &identity,
        connection_id,
        hub: &hub,
        coordinator: &coordinator,
        outbound,
        read_timeout: settings.read_timeout,
    };
    reader.run(stream, &cancel_token).await;

    cancel_token.cancel();
    if let Err(e) = writer.await {
        warn!(target: "party.hub", error = %e, "Write task failed");
    }

    hub.unregister(&identity.party_id, connection_id).await;
    info!(target: "party.hub", %connection_id, "Connection closed");
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    ping_interval: Duration,
    cancel_token: CancellationToken,
) {
    let start = tokio::time::Instant::now() + ping_interval;
    let mut ping_ticker = tokio::time::interval_at(start, ping_interval);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            frame = outbound.recv() => {
                let Some(text) = frame else {
                    break;
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!(target: "party.hub", error = %e, "Socket write failed");
                    break;
                }
            }
            _ = ping_ticker.tick() => {
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    debug!(target: "party.hub", error = %e, "Socket ping failed");
                    break;
                }
            }
        }
    }

    // Best effort; the peer may already be gone.
    let _ = sink.send(Message::Close(None)).await;
    cancel_token.cancel();
}

struct Reader<'a> {
    identity: &'a ConnectionIdentity,
    connection_id: ConnectionId,
    hub: &'a HubHandle,
    coordinator: &'a PartyCoordinator,
    outbound: OutboundSender,
    read_timeout: Duration,
}

impl Reader<'_> {
    async fn run(&self, mut stream: SplitStream<WebSocket>, cancel_token: &CancellationToken) {
        loop {
            let next = tokio::select! {
                () = cancel_token.cancelled() => break,
                next = tokio::time::timeout(self.read_timeout, stream.next()) => next,
            };

            let frame = match next {
                Err(_) => {
                    info!(
                        target: "party.hub",
                        connection_id = %self.connection_id,
                        "Read deadline expired, closing connection"
                    );
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    debug!(target: "party.hub", error = %e, "Socket read failed");
                    break;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                Message::Text(text) => self.handle_text(&text).await,
                Message::Binary(_) => {
                    metrics::record_ws_message("invalid");
                    self.reply(&ServerMessage::error("Binary frames are not supported"));
                }
                // Control frames only reset the deadline.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => break,
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                metrics::record_ws_message("invalid");
                debug!(target: "party.hub", error = %e, "Rejected inbound envelope");
                self.reply(&ServerMessage::error(e.to_string()));
                return;
            }
        };

        let outcome = dispatch(
            self.coordinator,
            &self.identity.party_id,
            &self.identity.user_id,
            message,
        )
        .await;

        match outcome {
            DispatchOutcome::Reply(message) => self.reply(&message),
            DispatchOutcome::Broadcast(party) => {
                if let Err(e) = self.hub.broadcast(&party).await {
                    warn!(target: "party.hub", error = %e, "Failed to broadcast party update");
                }
            }
        }
    }

    fn reply(&self, message: &ServerMessage) {
        enqueue(&self.outbound, self.connection_id, message);
    }
}

/// Queues a frame for this connection only. A full queue drops the frame.
fn enqueue(outbound: &OutboundSender, connection_id: ConnectionId, message: &ServerMessage) {
    let frame = match message.to_json() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(target: "party.hub", error = %e, "Failed to serialize outbound message");
            return;
        }
    };

    match outbound.try_send(frame) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!(target: "party.hub", %connection_id, "Outbound queue full, dropping reply");
            metrics::record_dropped_frame();
        }
        Err(TrySendError::Closed(_)) => {
            debug!(target: "party.hub", %connection_id, "Outbound queue closed");
        }
    }
}
