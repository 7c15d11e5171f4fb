//! WebSocket hub integration tests.
//!
//! Covers handshake authorization, broadcast scoping, per-sender error
//! replies and connection liveness against a real server.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use party_service::hub::HubSettings;
use party_service::store::SessionStore;
use party_test_utils::*;
use serde_json::json;
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(300);

/// Polls the hub until the party has `expected` connections.
async fn wait_for_connections(
    server: &TestPartyServer,
    party_id: &str,
    expected: usize,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let count = server.hub().connection_count(party_id).await?;
        if count == expected {
            return Ok(());
        }
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "party {party_id} has {count} connections, expected {expected}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_handshake_rejects_missing_and_unknown_tokens() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let created = create_party(&server, "Friday").await?;

    let missing = format!("ws://{}/ws/party/{}", server.addr(), created.party_id);
    assert_eq!(ws_rejection_status(&missing).await?, 401);

    let unknown = server.ws_url(&created.party_id, &"a".repeat(64));
    assert_eq!(ws_rejection_status(&unknown).await?, 401);

    let malformed = server.ws_url(&created.party_id, "not-a-token");
    assert_eq!(ws_rejection_status(&malformed).await?, 401);
    Ok(())
}

#[tokio::test]
async fn test_handshake_rejects_token_for_other_party() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let first = create_party(&server, "Friday").await?;
    let second = create_party(&server, "Saturday").await?;

    let url = server.ws_url(&second.party_id, &first.auth_token);
    assert_eq!(ws_rejection_status(&url).await?, 403);
    Ok(())
}

#[tokio::test]
async fn test_handshake_rejects_deleted_party() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let created = create_party(&server, "Friday").await?;
    server.store().delete_party(&created.party_id).await?;

    let url = server.ws_url(&created.party_id, &created.auth_token);
    assert_eq!(ws_rejection_status(&url).await?, 404);
    Ok(())
}

#[tokio::test]
async fn test_connect_sends_initial_party_update() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let created = create_party(&server, "Friday").await?;

    let mut socket = WsClient::connect(&server.ws_url(&created.party_id, &created.auth_token)).await?;
    let update = socket.recv_json().await?;

    assert_eq!(update["type"], "party_update");
    assert_eq!(update["payload"]["party"]["id"], created.party_id.as_str());
    assert_eq!(update["payload"]["party"]["phase"], "lobby");
    wait_for_connections(&server, &created.party_id, 1).await?;

    socket.close().await?;
    wait_for_connections(&server, &created.party_id, 0).await
}

#[tokio::test]
async fn test_ping_pong() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let created = create_party(&server, "Friday").await?;
    let mut socket =
        WsClient::connect_synced(&server.ws_url(&created.party_id, &created.auth_token)).await?;

    socket.send_json(&json!({ "type": "ping" })).await?;
    let pong = socket.recv_json().await?;

    assert_eq!(pong["type"], "pong");
    assert!(pong["payload"]["timestamp"].as_i64().unwrap_or_default() > 0);
    Ok(())
}

#[tokio::test]
async fn test_broadcast_is_scoped_to_party() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let party = create_party(&server, "Friday").await?;
    let alice = join_party(&server, &party.party_id, "Alice").await?;
    let other = create_party(&server, "Saturday").await?;

    let mut host = WsClient::connect_synced(&server.ws_url(&party.party_id, &party.auth_token)).await?;
    let mut guest = WsClient::connect_synced(&server.ws_url(&party.party_id, &alice.auth_token)).await?;
    let mut outsider = WsClient::connect_synced(&server.ws_url(&other.party_id, &other.auth_token)).await?;
    wait_for_connections(&server, &party.party_id, 2).await?;

    let response = start_nomination(&server, &party.party_id, &party.auth_token).await?;
    assert_eq!(response.status(), 200);

    for socket in [&mut host, &mut guest] {
        let update = socket.recv_type("party_update").await?;
        assert_eq!(update["payload"]["party"]["phase"], "nominating");
    }
    outsider.expect_silence(QUIET).await?;
    Ok(())
}

#[tokio::test]
async fn test_join_over_http_is_broadcast() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let party = create_party(&server, "Friday").await?;
    let mut host = WsClient::connect_synced(&server.ws_url(&party.party_id, &party.auth_token)).await?;
    wait_for_connections(&server, &party.party_id, 1).await?;

    let bob = join_party(&server, &party.party_id, "Bob").await?;

    let update = host.recv_type("party_update").await?;
    let participants = &update["payload"]["party"]["participants"];
    assert_eq!(participants[&bob.user_id]["username"], "Bob");
    Ok(())
}

#[tokio::test]
async fn test_errors_reply_only_to_sender() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let party = create_party(&server, "Friday").await?;
    let alice = join_party(&server, &party.party_id, "Alice").await?;

    let mut host = WsClient::connect_synced(&server.ws_url(&party.party_id, &party.auth_token)).await?;
    let mut guest = WsClient::connect_synced(&server.ws_url(&party.party_id, &alice.auth_token)).await?;
    wait_for_connections(&server, &party.party_id, 2).await?;

    guest.send_text("{not json").await?;
    let error = guest.recv_type("error").await?;
    assert_eq!(error["payload"]["message"], "Invalid message format");

    guest.send_json(&json!({ "type": "dance", "payload": {} })).await?;
    let error = guest.recv_type("error").await?;
    assert_eq!(error["payload"]["message"], "Unknown message type: dance");

    guest.send_json(&json!({ "type": "vote_nomination" })).await?;
    let error = guest.recv_type("error").await?;
    assert_eq!(error["payload"]["message"], "Invalid vote_nomination payload");

    // Domain errors follow the same path.
    guest.send_json(&json!({ "type": "finalize_nominations" })).await?;
    let error = guest.recv_type("error").await?;
    assert_eq!(
        error["payload"]["message"],
        "only the host can finalize nominations"
    );

    host.expect_silence(QUIET).await?;
    wait_for_connections(&server, &party.party_id, 2).await
}

#[tokio::test]
async fn test_search_over_socket() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let party = create_party(&server, "Friday").await?;
    let mut host = WsClient::connect_synced(&server.ws_url(&party.party_id, &party.auth_token)).await?;

    host.send_json(&json!({ "type": "search_movies", "payload": { "query": "  jaws " } }))
        .await?;
    let results = host.recv_type("search_results").await?;

    assert_eq!(results["payload"]["query"], "jaws");
    assert_eq!(results["payload"]["movies"][0]["title"], "Jaws");
    Ok(())
}

#[tokio::test]
async fn test_silent_client_is_dropped() -> Result<()> {
    let server = TestPartyServer::spawn_with(TestServerOptions {
        hub: HubSettings {
            ping_interval: Duration::from_millis(100),
            read_timeout: Duration::from_millis(300),
            ..HubSettings::default()
        },
        ..TestServerOptions::default()
    })
    .await?;
    let party = create_party(&server, "Friday").await?;

    // Never polled, so server pings go unanswered.
    let _silent = WsClient::connect(&server.ws_url(&party.party_id, &party.auth_token)).await?;
    wait_for_connections(&server, &party.party_id, 1).await?;

    wait_for_connections(&server, &party.party_id, 0).await?;

    // Dropping the socket does not remove the participant.
    let stored = server.coordinator().get_session(&party.party_id).await?;
    assert!(stored.is_participant(&party.host_id));
    Ok(())
}

#[tokio::test]
async fn test_responsive_client_survives_pings() -> Result<()> {
    let server = TestPartyServer::spawn_with(TestServerOptions {
        hub: HubSettings {
            ping_interval: Duration::from_millis(100),
            read_timeout: Duration::from_millis(300),
            ..HubSettings::default()
        },
        ..TestServerOptions::default()
    })
    .await?;
    let party = create_party(&server, "Friday").await?;
    let mut host = WsClient::connect_synced(&server.ws_url(&party.party_id, &party.auth_token)).await?;

    // Polling the stream answers pings automatically.
    host.expect_silence(Duration::from_millis(800)).await?;

    assert_eq!(server.hub().connection_count(&party.party_id).await?, 1);
    host.send_json(&json!({ "type": "ping" })).await?;
    assert_eq!(host.recv_type("pong").await?["type"], "pong");
    Ok(())
}
