//! Bearer token middleware for host-only HTTP routes.
//!
//! Validates the party token from the Authorization header and injects the
//! resolved [`AuthToken`] into request extensions. Party and role checks are
//! left to the handler.

use crate::errors::PartyError;
use crate::party::AuthToken;
use crate::routes::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

fn extract_bearer_token(req: &Request) -> Result<&str, PartyError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "party.middleware.auth", "Missing Authorization header");
            PartyError::Authentication("Missing Authorization header".to_string())
        })?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "party.middleware.auth", "Invalid Authorization header format");
        PartyError::Authentication("Invalid Authorization header format".to_string())
    })
}

/// Rejects with 401 unless the request carries a live party token.
#[instrument(skip_all, name = "party.middleware.auth")]
pub async fn require_party_token(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, PartyError> {
    let token = extract_bearer_token(&req)?.to_string();
    let auth: AuthToken = state.coordinator.tokens().validate_token(&token).await?;

    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}
