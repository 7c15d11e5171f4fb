//! Session-scoped credentials.
//!
//! A token is 32 bytes from the system CSPRNG, hex encoded. It binds one
//! participant of one party and expires 24 hours after issue. Records live in
//! the token store under a TTL equal to their remaining lifetime; an expired
//! record seen during validation is purged immediately.

use crate::errors::PartyError;
use crate::store::TokenStore;
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Random bytes per token.
pub const TOKEN_BYTES: usize = 32;

/// Absolute token lifetime.
pub const TOKEN_LIFETIME_HOURS: i64 = 24;

/// Persisted credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub token: String,
    pub party_id: String,
    pub user_id: String,
    pub username: String,
    pub is_host: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining_lifetime(&self) -> std::time::Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"[REDACTED]")
            .field("party_id", &self.party_id)
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("is_host", &self.is_host)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Whether `token` has the shape of an issued token: 64 lowercase hex chars.
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_BYTES * 2
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Issues and validates session tokens.
pub struct TokenAuthority {
    store: Arc<dyn TokenStore>,
    rng: SystemRandom,
    lifetime: chrono::Duration,
}

impl TokenAuthority {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self::with_lifetime(store, chrono::Duration::hours(TOKEN_LIFETIME_HOURS))
    }

    /// Authority with a non-default lifetime. Used to exercise expiry.
    pub fn with_lifetime(store: Arc<dyn TokenStore>, lifetime: chrono::Duration) -> Self {
        Self {
            store,
            rng: SystemRandom::new(),
            lifetime,
        }
    }

    /// Generates and persists a token bound to one participant of one party.
    #[instrument(skip_all, fields(party_id = %party_id, user_id = %user_id))]
    pub async fn create_token(
        &self,
        party_id: &str,
        user_id: &str,
        username: &str,
        is_host: bool,
    ) -> Result<AuthToken, PartyError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| {
            tracing::error!(target: "party.auth", "Failed to generate random bytes");
            PartyError::Internal("token generation failed".to_string())
        })?;

        let now = Utc::now();
        let token = AuthToken {
            token: hex::encode(bytes),
            party_id: party_id.to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            is_host,
            created_at: now,
            expires_at: now + self.lifetime,
        };

        self.store.save_token(&token).await?;
        debug!(target: "party.auth", is_host, "Issued session token");
        Ok(token)
    }

    /// Returns the identity bound to `token`.
    ///
    /// # Errors
    ///
    /// `PartyError::Authentication` when the token is missing, malformed,
    /// unknown or expired.
    #[instrument(skip_all)]
    pub async fn validate_token(&self, token: &str) -> Result<AuthToken, PartyError> {
        if token.is_empty() {
            return Err(PartyError::Authentication("missing token".to_string()));
        }
        if !is_well_formed(token) {
            return Err(PartyError::Authentication("malformed token".to_string()));
        }

        let record = self
            .store
            .get_token(token)
            .await?
            .ok_or_else(|| PartyError::Authentication("invalid token".to_string()))?;

        if record.is_expired() {
            self.store.delete_token(token).await?;
            debug!(target: "party.auth", party_id = %record.party_id, "Purged expired token");
            return Err(PartyError::Authentication("token expired".to_string()));
        }

        Ok(record)
    }

    /// Validates `token` and checks it is bound to `party_id`.
    ///
    /// # Errors
    ///
    /// As [`validate_token`](Self::validate_token), plus
    /// `PartyError::Authorization` when the token belongs to another party.
    pub async fn authorize(&self, token: &str, party_id: &str) -> Result<AuthToken, PartyError> {
        let record = self.validate_token(token).await?;
        if record.party_id != party_id {
            return Err(PartyError::Authorization(
                "token is not valid for this party".to_string(),
            ));
        }
        Ok(record)
    }

    pub async fn revoke_token(&self, token: &str) -> Result<(), PartyError> {
        self.store.delete_token(token).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn authority() -> (TokenAuthority, InMemoryStore) {
        let store = InMemoryStore::new();
        (TokenAuthority::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_create_token_shape_and_expiry() {
        let (auth, store) = authority();
        let token = auth.create_token("party-1", "user-1", "Host", true).await.unwrap();

        assert!(is_well_formed(&token.token));
        assert_eq!(token.expires_at - token.created_at, chrono::Duration::hours(24));
        assert!(store.has_token(&token.token));
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let (auth, _) = authority();
        let a = auth.create_token("p", "u1", "a", false).await.unwrap();
        let b = auth.create_token("p", "u2", "b", false).await.unwrap();
        assert_ne!(a.token, b.token);
    }

    #[tokio::test]
    async fn test_validate_returns_bound_identity() {
        let (auth, _) = authority();
        let issued = auth.create_token("party-1", "user-1", "Alice", false).await.unwrap();

        let record = auth.validate_token(&issued.token).await.unwrap();
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.username, "Alice");
        assert!(!record.is_host);
    }

    #[tokio::test]
    async fn test_validate_rejects_missing_malformed_and_unknown() {
        let (auth, _) = authority();
        let uppercase = "A".repeat(64);
        let unknown = "0".repeat(64);

        for candidate in ["", "short", uppercase.as_str(), unknown.as_str()] {
            assert!(
                matches!(
                    auth.validate_token(candidate).await,
                    Err(PartyError::Authentication(_))
                ),
                "{candidate:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_and_purged() {
        let store = InMemoryStore::new();
        let auth = TokenAuthority::with_lifetime(
            Arc::new(store.clone()),
            chrono::Duration::seconds(-1),
        );
        let issued = auth.create_token("p", "u", "x", false).await.unwrap();
        assert!(store.has_token(&issued.token));

        let result = auth.validate_token(&issued.token).await;

        assert!(matches!(result, Err(PartyError::Authentication(_))));
        assert!(!store.has_token(&issued.token));
    }

    #[tokio::test]
    async fn test_authorize_party_mismatch() {
        let (auth, _) = authority();
        let issued = auth.create_token("party-1", "u", "x", false).await.unwrap();

        assert!(auth.authorize(&issued.token, "party-1").await.is_ok());
        assert!(matches!(
            auth.authorize(&issued.token, "party-2").await,
            Err(PartyError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_token() {
        let (auth, _) = authority();
        let issued = auth.create_token("p", "u", "x", false).await.unwrap();

        auth.revoke_token(&issued.token).await.unwrap();
        assert!(matches!(
            auth.validate_token(&issued.token).await,
            Err(PartyError::Authentication(_))
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = AuthToken {
            token: "ab".repeat(32),
            party_id: "p".into(),
            user_id: "u".into(),
            username: "x".into(),
            is_host: false,
            created_at: Utc::now(),
            expires_at: Utc::now(),
        };
        assert!(!format!("{token:?}").contains(&"ab".repeat(32)));
    }
}
