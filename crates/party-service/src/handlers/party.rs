//! Party handlers.
//!
//! - `POST /api/party` - Create party, caller becomes host
//! - `GET /api/party/{id}` - Party snapshot
//! - `POST /api/party/{id}/join` - Join as a named participant
//! - `POST /api/party/{id}/start-nomination` - Host opens nominations
//!
//! Joins and phase changes are broadcast to the party's live connections.

use crate::errors::PartyError;
use crate::models::{
    CreatePartyRequest, CreatePartyResponse, JoinPartyRequest, JoinPartyResponse, Party,
};
use crate::party::AuthToken;
use crate::routes::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Handler for POST /api/party
#[instrument(skip_all, name = "party.http.create")]
pub async fn create_party(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreatePartyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatePartyResponse>), PartyError> {
    let Json(request) = body.map_err(invalid_body)?;
    let created = state.coordinator.create_session(&request.name).await?;

    info!(
        target: "party.http",
        party_id = %created.party.id,
        "Party created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreatePartyResponse {
            party_id: created.party.id.clone(),
            host_id: created.host_id,
            party: created.party,
            auth_token: created.auth_token.token,
        }),
    ))
}

/// Handler for GET /api/party/{id}
#[instrument(skip_all, name = "party.http.get", fields(party_id = %party_id))]
pub async fn get_party(
    State(state): State<Arc<AppState>>,
    Path(party_id): Path<String>,
) -> Result<Json<Party>, PartyError> {
    Ok(Json(state.coordinator.get_session(&party_id).await?))
}

/// Handler for POST /api/party/{id}/join
#[instrument(skip_all, name = "party.http.join", fields(party_id = %party_id))]
pub async fn join_party(
    State(state): State<Arc<AppState>>,
    Path(party_id): Path<String>,
    body: Result<Json<JoinPartyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JoinPartyResponse>), PartyError> {
    let Json(request) = body.map_err(invalid_body)?;
    let joined = state
        .coordinator
        .join_session(&party_id, &request.username)
        .await?;

    broadcast(&state, &joined.party).await;

    Ok((
        StatusCode::CREATED,
        Json(JoinPartyResponse {
            user_id: joined.participant.id.clone(),
            participant: joined.participant,
            party: joined.party,
            auth_token: joined.auth_token.token,
        }),
    ))
}

/// Handler for POST /api/party/{id}/start-nomination
///
/// Requires a bearer token (validated by `require_party_token`) issued for
/// this party to its host.
#[instrument(skip_all, name = "party.http.start_nomination", fields(party_id = %party_id))]
pub async fn start_nomination(
    State(state): State<Arc<AppState>>,
    Path(party_id): Path<String>,
    Extension(token): Extension<AuthToken>,
) -> Result<Json<Party>, PartyError> {
    if token.party_id != party_id {
        return Err(PartyError::Authorization(
            "token is not valid for this party".to_string(),
        ));
    }

    let party = state
        .coordinator
        .start_nomination(&party_id, &token.user_id)
        .await?;

    broadcast(&state, &party).await;
    Ok(Json(party))
}

fn invalid_body(rejection: JsonRejection) -> PartyError {
    PartyError::Validation(format!("Invalid request body: {}", rejection.body_text()))
}

/// The HTTP result does not depend on delivery to live connections.
async fn broadcast(state: &AppState, party: &Party) {
    if let Err(e) = state.hub.broadcast(party).await {
        warn!(target: "party.http", error = %e, "Failed to broadcast party update");
    }
}
