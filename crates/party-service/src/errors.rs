//! Party service error types.
//!
//! Every coordinator operation returns [`PartyError`]. HTTP handlers turn it
//! into a response through `IntoResponse`; the WebSocket hub turns it into an
//! `error` frame for the originating connection. Infrastructure failures are
//! logged server-side and reach the caller only as a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Party service error type.
///
/// Maps to HTTP status codes:
/// - Validation: 400 Bad Request
/// - Authentication: 401 Unauthorized
/// - Authorization: 403 Forbidden
/// - NotFound: 404 Not Found
/// - PhaseViolation, Conflict: 409 Conflict
/// - Upstream: 502 Bad Gateway
/// - Store, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum PartyError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Phase violation: {0}")]
    PhaseViolation(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PartyError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PartyError::Validation(_) => StatusCode::BAD_REQUEST,
            PartyError::NotFound(_) => StatusCode::NOT_FOUND,
            PartyError::PhaseViolation(_) | PartyError::Conflict(_) => StatusCode::CONFLICT,
            PartyError::Authorization(_) => StatusCode::FORBIDDEN,
            PartyError::Authentication(_) => StatusCode::UNAUTHORIZED,
            PartyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            PartyError::Store(_) | PartyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for clients and metric labels.
    pub fn error_code(&self) -> &'static str {
        match self {
            PartyError::Validation(_) => "VALIDATION_ERROR",
            PartyError::NotFound(_) => "NOT_FOUND",
            PartyError::PhaseViolation(_) => "PHASE_VIOLATION",
            PartyError::Authorization(_) => "FORBIDDEN",
            PartyError::Authentication(_) => "UNAUTHORIZED",
            PartyError::Conflict(_) => "CONFLICT",
            PartyError::Upstream(_) => "UPSTREAM_ERROR",
            PartyError::Store(_) => "STORE_ERROR",
            PartyError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message that is safe to return to clients.
    ///
    /// Store, Internal and Upstream details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            PartyError::Validation(msg)
            | PartyError::NotFound(msg)
            | PartyError::PhaseViolation(msg)
            | PartyError::Authorization(msg)
            | PartyError::Authentication(msg)
            | PartyError::Conflict(msg) => msg.clone(),
            PartyError::Upstream(_) => "Movie catalog is unavailable".to_string(),
            PartyError::Store(_) => "An internal storage error occurred".to_string(),
            PartyError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Logs infrastructure details that are withheld from clients.
    pub(crate) fn log_if_internal(&self) {
        match self {
            PartyError::Store(err) => {
                tracing::error!(target: "party.store", error = %err, "Session store operation failed");
            }
            PartyError::Upstream(err) => {
                tracing::warn!(target: "party.catalog", error = %err, "Movie catalog request failed");
            }
            PartyError::Internal(err) => {
                tracing::error!(target: "party.internal", error = %err, "Internal error");
            }
            _ => {}
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for PartyError {
    fn into_response(self) -> Response {
        self.log_if_internal();

        let status = self.status_code();
        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.client_message(),
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"watch-party\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

impl From<redis::RedisError> for PartyError {
    fn from(err: redis::RedisError) -> Self {
        PartyError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for PartyError {
    fn from(err: serde_json::Error) -> Self {
        PartyError::Internal(format!("serialization failed: {err}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PartyError::Validation("x".into()), 400),
            (PartyError::NotFound("x".into()), 404),
            (PartyError::PhaseViolation("x".into()), 409),
            (PartyError::Authorization("x".into()), 403),
            (PartyError::Authentication("x".into()), 401),
            (PartyError::Conflict("x".into()), 409),
            (PartyError::Upstream("x".into()), 502),
            (PartyError::Store("x".into()), 500),
            (PartyError::Internal("x".into()), 500),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status_code().as_u16(), expected, "{error}");
        }
    }

    #[test]
    fn test_display_phase_violation() {
        let error = PartyError::PhaseViolation("party is not in lobby".to_string());
        assert_eq!(format!("{}", error), "Phase violation: party is not in lobby");
    }

    #[test]
    fn test_client_message_hides_store_details() {
        let error = PartyError::Store("connection refused at redis://10.0.0.1".to_string());
        assert!(!error.client_message().contains("redis"));
        assert_eq!(error.error_code(), "STORE_ERROR");
    }

    #[test]
    fn test_client_message_passes_domain_reason() {
        let error = PartyError::Conflict("username already taken".to_string());
        assert_eq!(error.client_message(), "username already taken");
    }

    #[tokio::test]
    async fn test_into_response_not_found() {
        let response = PartyError::NotFound("party not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["message"], "party not found");
    }

    #[tokio::test]
    async fn test_into_response_upstream_is_generic() {
        let response = PartyError::Upstream("tmdb returned 503".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
        assert_eq!(body["error"]["message"], "Movie catalog is unavailable");
    }

    #[tokio::test]
    async fn test_into_response_unauthorized_sets_www_authenticate() {
        let response = PartyError::Authentication("invalid token".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let header = response.headers().get("WWW-Authenticate").unwrap();
        assert!(header.to_str().unwrap().contains("invalid_token"));
    }
}
