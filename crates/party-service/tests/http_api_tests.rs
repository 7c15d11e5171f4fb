//! HTTP API integration tests.
//!
//! Runs the real router on an ephemeral port and checks status mapping and
//! error bodies for every public endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use party_service::catalog::mock::MockMovieCatalog;
use party_service::models::Phase;
use party_test_utils::*;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn error_code(response: reqwest::Response) -> Result<String> {
    let body: Value = response.json().await?;
    Ok(body["error"]["code"].as_str().unwrap_or_default().to_string())
}

#[tokio::test]
async fn test_create_party_returns_host_and_token() -> Result<()> {
    let server = TestPartyServer::spawn().await?;

    let created = create_party(&server, "Movie Night").await?;

    assert_eq!(created.party.name, "Movie Night");
    assert_eq!(created.party.phase, Phase::Lobby);
    assert_eq!(created.party_id, created.party.id);
    assert!(created.party.is_host(&created.host_id));
    assert_eq!(created.auth_token.len(), 64);
    assert!(created.auth_token.bytes().all(|b| b.is_ascii_hexdigit()));
    Ok(())
}

#[tokio::test]
async fn test_create_party_rejects_blank_name() -> Result<()> {
    let server = TestPartyServer::spawn().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/party", server.url()))
        .json(&json!({ "name": "   " }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await?, "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn test_create_party_rejects_malformed_body() -> Result<()> {
    let server = TestPartyServer::spawn().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/party", server.url()))
        .header("content-type", "application/json")
        .body("{\"name\":")
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await?, "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn test_get_party() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let created = create_party(&server, "Friday").await?;

    let response = reqwest::get(format!("{}/api/party/{}", server.url(), created.party_id)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let party: Value = response.json().await?;
    assert_eq!(party["id"], created.party_id.as_str());
    assert_eq!(party["phase"], "lobby");

    let response = reqwest::get(format!("{}/api/party/does-not-exist", server.url())).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await?, "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn test_join_party_and_duplicate_usernames() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let created = create_party(&server, "Friday").await?;

    let alice = join_party(&server, &created.party_id, "Alice").await?;
    assert_eq!(alice.participant.username, "Alice");
    assert!(!alice.participant.is_host);
    assert_eq!(alice.user_id, alice.participant.id);
    assert_eq!(alice.party.participants.len(), 2);

    // Case-sensitive: "alice" is a different name.
    let lower = join_party(&server, &created.party_id, "alice").await?;
    assert_eq!(lower.party.participants.len(), 3);

    let response = reqwest::Client::new()
        .post(format!("{}/api/party/{}/join", server.url(), created.party_id))
        .json(&json!({ "username": "Alice" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(response).await?, "CONFLICT");
    Ok(())
}

#[tokio::test]
async fn test_join_unknown_party_and_blank_username() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/party/missing/join", server.url()))
        .json(&json!({ "username": "Alice" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let created = create_party(&server, "Friday").await?;
    let response = client
        .post(format!("{}/api/party/{}/join", server.url(), created.party_id))
        .json(&json!({ "username": "" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_start_nomination_requires_token() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let created = create_party(&server, "Friday").await?;

    let response = reqwest::Client::new()
        .post(format!(
            "{}/api/party/{}/start-nomination",
            server.url(),
            created.party_id
        ))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("www-authenticate"));
    assert_eq!(error_code(response).await?, "UNAUTHORIZED");

    let response = start_nomination(&server, &created.party_id, &"0".repeat(64)).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_start_nomination_role_and_party_checks() -> Result<()> {
    let server = TestPartyServer::spawn().await?;
    let created = create_party(&server, "Friday").await?;
    let other = create_party(&server, "Saturday").await?;
    let alice = join_party(&server, &created.party_id, "Alice").await?;

    let response = start_nomination(&server, &created.party_id, &alice.auth_token).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await?, "FORBIDDEN");

    // Host of another party.
    let response = start_nomination(&server, &created.party_id, &other.auth_token).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = start_nomination(&server, &created.party_id, &created.auth_token).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let party: Value = response.json().await?;
    assert_eq!(party["phase"], "nominating");

    let response = start_nomination(&server, &created.party_id, &created.auth_token).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(response).await?, "PHASE_VIOLATION");
    Ok(())
}

#[tokio::test]
async fn test_search_movies() -> Result<()> {
    let server = TestPartyServer::spawn().await?;

    let response = reqwest::get(format!("{}/api/movies/search?q=heat", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["query"], "heat");
    assert_eq!(body["movies"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["movies"][0]["title"], "Heat");

    let response = reqwest::get(format!("{}/api/movies/search", server.url())).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_search_upstream_failure_is_bad_gateway() -> Result<()> {
    let server = TestPartyServer::spawn_with(TestServerOptions {
        catalog: MockMovieCatalog::failing(),
        ..TestServerOptions::default()
    })
    .await?;

    let response = reqwest::get(format!("{}/api/movies/search?q=heat", server.url())).await?;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
    assert_eq!(body["error"]["message"], "Movie catalog is unavailable");
    Ok(())
}

#[tokio::test]
async fn test_readiness_and_shutdown() -> Result<()> {
    let server = TestPartyServer::spawn().await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "ready");

    server.begin_shutdown();

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint() -> Result<()> {
    let server = TestPartyServer::spawn().await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
