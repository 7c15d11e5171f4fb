//! WebSocket upgrade handler.
//!
//! `GET /ws/party/{party_id}?token=...`
//!
//! The token is checked before the upgrade, so every rejection is a plain
//! HTTP error response:
//!
//! - missing, malformed, unknown or expired token: 401
//! - token issued for another party: 403
//! - party gone: 404
//! - participant no longer in the party: 403

use crate::errors::PartyError;
use crate::hub::{run_connection, ConnectionIdentity};
use crate::routes::AppState;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Handler for GET /ws/party/{party_id}
#[instrument(skip_all, name = "party.http.ws_upgrade", fields(party_id = %party_id))]
pub async fn party_socket(
    State(state): State<Arc<AppState>>,
    Path(party_id): Path<String>,
    Query(query): Query<WsQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, PartyError> {
    let token = query
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| PartyError::Authentication("token is required".to_string()))?;

    let auth = state.coordinator.tokens().authorize(&token, &party_id).await?;

    let party = state.coordinator.get_session(&party_id).await?;
    if !party.is_participant(&auth.user_id) {
        return Err(PartyError::Authorization(
            "participant is no longer in this party".to_string(),
        ));
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            debug!(target: "party.http", "Request to WebSocket endpoint without upgrade");
            return Ok(rejection.into_response());
        }
    };

    let identity = ConnectionIdentity {
        party_id,
        user_id: auth.user_id,
    };
    let hub = state.hub.clone();
    let coordinator = Arc::clone(&state.coordinator);
    let settings = state.hub_settings.clone();

    Ok(upgrade
        .max_message_size(settings.max_message_bytes)
        .max_frame_size(settings.max_message_bytes)
        .on_failed_upgrade(|e| {
            warn!(target: "party.http", error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| run_connection(socket, identity, hub, coordinator, settings)))
}
