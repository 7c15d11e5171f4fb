//! Redis-backed session store.
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently, so every operation clones it instead of locking.

use super::{lock_key, party_key, token_key, SessionLock, SessionStore, TokenStore};
use crate::errors::PartyError;
use crate::models::Party;
use crate::party::auth::AuthToken;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Value written under a held lock key.
const LOCK_VALUE: &str = "locked";

/// Party, lock and token persistence over one multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
    session_ttl: Duration,
}

impl RedisStore {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns `PartyError::Store` if the client cannot be opened or the
    /// connection cannot be established.
    pub async fn connect(redis_url: &str, session_ttl: Duration) -> Result<Self, PartyError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do NOT log redis_url, it may carry credentials.
            error!(target: "party.store", error = %e, "Failed to open Redis client");
            PartyError::Store(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "party.store", error = %e, "Failed to connect to Redis");
                PartyError::Store(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            connection,
            session_ttl,
        })
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    #[instrument(skip_all, fields(party_id = %party_id))]
    async fn get_party(&self, party_id: &str) -> Result<Option<Party>, PartyError> {
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(party_key(party_id)).await.map_err(|e| {
            warn!(target: "party.store", error = %e, party_id = %party_id, "Failed to get party");
            PartyError::Store(format!("Failed to get party: {e}"))
        })?;

        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| {
                error!(target: "party.store", error = %e, party_id = %party_id, "Corrupt party record");
                PartyError::Internal(format!("party record is corrupt: {e}"))
            })
    }

    #[instrument(skip_all, fields(party_id = %party.id))]
    async fn save_party(&self, party: &Party) -> Result<(), PartyError> {
        let json = serde_json::to_string(party)?;
        let mut conn = self.connection.clone();

        let _: () = conn
            .set_ex(party_key(&party.id), json, self.session_ttl.as_secs())
            .await
            .map_err(|e| {
                warn!(target: "party.store", error = %e, party_id = %party.id, "Failed to save party");
                PartyError::Store(format!("Failed to save party: {e}"))
            })?;

        debug!(target: "party.store", party_id = %party.id, phase = %party.phase, "Saved party");
        Ok(())
    }

    #[instrument(skip_all, fields(party_id = %party_id))]
    async fn delete_party(&self, party_id: &str) -> Result<(), PartyError> {
        let mut conn = self.connection.clone();

        let _: () = conn.del(party_key(party_id)).await.map_err(|e| {
            warn!(target: "party.store", error = %e, party_id = %party_id, "Failed to delete party");
            PartyError::Store(format!("Failed to delete party: {e}"))
        })?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), PartyError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionLock for RedisStore {
    #[instrument(skip_all, fields(party_id = %party_id))]
    async fn acquire_lock(&self, party_id: &str, duration: Duration) -> Result<bool, PartyError> {
        let mut conn = self.connection.clone();

        // SET key locked NX PX <ms> replies OK when set, nil when held.
        let reply: Option<String> = redis::cmd("SET")
            .arg(lock_key(party_id))
            .arg(LOCK_VALUE)
            .arg("NX")
            .arg("PX")
            .arg(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(target: "party.store", error = %e, party_id = %party_id, "Failed to acquire lock");
                PartyError::Store(format!("Failed to acquire lock: {e}"))
            })?;

        Ok(reply.is_some())
    }

    #[instrument(skip_all, fields(party_id = %party_id))]
    async fn release_lock(&self, party_id: &str) -> Result<(), PartyError> {
        let mut conn = self.connection.clone();

        let _: () = conn.del(lock_key(party_id)).await.map_err(|e| {
            warn!(target: "party.store", error = %e, party_id = %party_id, "Failed to release lock");
            PartyError::Store(format!("Failed to release lock: {e}"))
        })?;

        Ok(())
    }
}

#[async_trait]
impl TokenStore for RedisStore {
    #[instrument(skip_all, fields(party_id = %token.party_id))]
    async fn save_token(&self, token: &AuthToken) -> Result<(), PartyError> {
        let json = serde_json::to_string(token)?;
        let ttl = token.remaining_lifetime().as_secs().max(1);
        let mut conn = self.connection.clone();

        let _: () = conn
            .set_ex(token_key(&token.token), json, ttl)
            .await
            .map_err(|e| {
                // Token value is a credential and is never logged.
                warn!(target: "party.store", error = %e, "Failed to save auth token");
                PartyError::Store(format!("Failed to save auth token: {e}"))
            })?;

        Ok(())
    }

    #[instrument(skip_all)]
    async fn get_token(&self, token: &str) -> Result<Option<AuthToken>, PartyError> {
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(token_key(token)).await.map_err(|e| {
            warn!(target: "party.store", error = %e, "Failed to get auth token");
            PartyError::Store(format!("Failed to get auth token: {e}"))
        })?;

        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| PartyError::Internal(format!("auth token record is corrupt: {e}")))
    }

    #[instrument(skip_all)]
    async fn delete_token(&self, token: &str) -> Result<(), PartyError> {
        let mut conn = self.connection.clone();

        let _: () = conn.del(token_key(token)).await.map_err(|e| {
            warn!(target: "party.store", error = %e, "Failed to delete auth token");
            PartyError::Store(format!("Failed to delete auth token: {e}"))
        })?;

        Ok(())
    }
}
