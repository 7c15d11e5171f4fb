//! HTTP and WebSocket client fixtures.

use crate::server_harness::TestPartyServer;
use futures::{SinkExt, StreamExt};
use party_service::models::{CreatePartyResponse, JoinPartyResponse};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Default wait for an expected frame.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// `POST /api/party` and decode the 201 body.
pub async fn create_party(
    server: &TestPartyServer,
    name: &str,
) -> Result<CreatePartyResponse, anyhow::Error> {
    let response = reqwest::Client::new()
        .post(format!("{}/api/party", server.url()))
        .json(&serde_json::json!({ "name": name }))
        .send()
        .await?;

    anyhow::ensure!(
        response.status() == reqwest::StatusCode::CREATED,
        "create party returned {}",
        response.status()
    );
    Ok(response.json().await?)
}

/// `POST /api/party/{id}/join` and decode the 201 body.
pub async fn join_party(
    server: &TestPartyServer,
    party_id: &str,
    username: &str,
) -> Result<JoinPartyResponse, anyhow::Error> {
    let response = reqwest::Client::new()
        .post(format!("{}/api/party/{}/join", server.url(), party_id))
        .json(&serde_json::json!({ "username": username }))
        .send()
        .await?;

    anyhow::ensure!(
        response.status() == reqwest::StatusCode::CREATED,
        "join party returned {}",
        response.status()
    );
    Ok(response.json().await?)
}

/// `POST /api/party/{id}/start-nomination` with a bearer token.
pub async fn start_nomination(
    server: &TestPartyServer,
    party_id: &str,
    token: &str,
) -> Result<reqwest::Response, anyhow::Error> {
    Ok(reqwest::Client::new()
        .post(format!(
            "{}/api/party/{}/start-nomination",
            server.url(),
            party_id
        ))
        .bearer_auth(token)
        .send()
        .await?)
}

/// HTTP status of a rejected WebSocket handshake.
pub async fn ws_rejection_status(url: &str) -> Result<u16, anyhow::Error> {
    match connect_async(url).await {
        Ok(_) => anyhow::bail!("WebSocket handshake unexpectedly succeeded"),
        Err(tungstenite::Error::Http(response)) => Ok(response.status().as_u16()),
        Err(e) => anyhow::bail!("unexpected handshake error: {e}"),
    }
}

/// Thin WebSocket client speaking the JSON envelope protocol.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let (stream, _response) = connect_async(url).await?;
        Ok(Self { stream })
    }

    /// Connects and consumes the initial `party_update` sync frame.
    pub async fn connect_synced(url: &str) -> Result<Self, anyhow::Error> {
        let mut client = Self::connect(url).await?;
        client.recv_type("party_update").await?;
        Ok(client)
    }

    pub async fn send_json(&mut self, value: &Value) -> Result<(), anyhow::Error> {
        self.send_text(&value.to_string()).await
    }

    pub async fn send_text(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.stream.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Next text frame as JSON. Control frames are skipped.
    pub async fn recv_json(&mut self) -> Result<Value, anyhow::Error> {
        self.recv_within(RECV_TIMEOUT)
            .await?
            .ok_or_else(|| anyhow::anyhow!("connection closed while waiting for a frame"))
    }

    /// Next frame whose `type` is `message_type`, skipping others.
    pub async fn recv_type(&mut self, message_type: &str) -> Result<Value, anyhow::Error> {
        loop {
            let frame = self.recv_json().await?;
            if frame["type"] == message_type {
                return Ok(frame);
            }
        }
    }

    /// Fails if a text frame arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) -> Result<(), anyhow::Error> {
        match tokio::time::timeout(wait, self.recv_within(wait)).await {
            Err(_) | Ok(Err(_)) | Ok(Ok(None)) => Ok(()),
            Ok(Ok(Some(frame))) => anyhow::bail!("expected no frame, got {frame}"),
        }
    }

    /// Waits for the server to close the connection.
    pub async fn wait_closed(&mut self, within: Duration) -> Result<(), anyhow::Error> {
        let closed = tokio::time::timeout(within, async {
            while let Some(frame) = self.stream.next().await {
                match frame {
                    Ok(Message::Close(_)) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        })
        .await;
        anyhow::ensure!(closed.is_ok(), "connection still open after {within:?}");
        Ok(())
    }

    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.stream.close(None).await?;
        Ok(())
    }

    async fn recv_within(&mut self, wait: Duration) -> Result<Option<Value>, anyhow::Error> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.stream.next())
                .await
                .map_err(|_| anyhow::anyhow!("no frame within {wait:?}"))?;

            match frame {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => return Ok(Some(serde_json::from_str(&text)?)),
                Some(Ok(_)) => {}
            }
        }
    }
}
