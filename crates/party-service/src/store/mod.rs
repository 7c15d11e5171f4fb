//! Session persistence capabilities.
//!
//! The coordinator never caches a party in process memory; it reads and writes
//! through these traits on every operation. [`RedisStore`] is the production
//! implementation and [`InMemoryStore`] the deterministic one used by tests.
//!
//! # Key Patterns
//!
//! - `party:{id}` - Party record (JSON, TTL refreshed on every save)
//! - `party:lock:{id}` - Per-party mutation lock (`locked`, PX expiry)
//! - `token:{token}` - Session credential (JSON, TTL until expiry)

mod memory;
mod redis;

pub use self::memory::InMemoryStore;
pub use self::redis::RedisStore;

use crate::errors::PartyError;
use crate::models::Party;
use crate::party::auth::AuthToken;
use async_trait::async_trait;
use std::time::Duration;

/// Redis key for a party record.
pub fn party_key(party_id: &str) -> String {
    format!("party:{party_id}")
}

/// Redis key for a party's mutation lock.
pub fn lock_key(party_id: &str) -> String {
    format!("party:lock:{party_id}")
}

/// Redis key for a session credential.
pub fn token_key(token: &str) -> String {
    format!("token:{token}")
}

/// Full-record party persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns `None` when the party does not exist or has expired.
    async fn get_party(&self, party_id: &str) -> Result<Option<Party>, PartyError>;

    /// Writes the whole record and refreshes its TTL.
    async fn save_party(&self, party: &Party) -> Result<(), PartyError>;

    async fn delete_party(&self, party_id: &str) -> Result<(), PartyError>;

    /// Connectivity probe for readiness checks.
    async fn ping(&self) -> Result<(), PartyError>;
}

/// Per-party mutual exclusion.
#[async_trait]
pub trait SessionLock: Send + Sync {
    /// Single non-blocking attempt. Returns `false` when already held.
    async fn acquire_lock(&self, party_id: &str, duration: Duration) -> Result<bool, PartyError>;

    /// Unconditional release.
    async fn release_lock(&self, party_id: &str) -> Result<(), PartyError>;
}

/// Credential persistence.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save_token(&self, token: &AuthToken) -> Result<(), PartyError>;

    async fn get_token(&self, token: &str) -> Result<Option<AuthToken>, PartyError>;

    async fn delete_token(&self, token: &str) -> Result<(), PartyError>;
}

/// Everything the coordinator needs from its backing store.
pub trait PartyStore: SessionStore + SessionLock + TokenStore {}

impl<T: SessionStore + SessionLock + TokenStore> PartyStore for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_patterns() {
        assert_eq!(party_key("abc"), "party:abc");
        assert_eq!(lock_key("abc"), "party:lock:abc");
        assert_eq!(token_key("ff00"), "token:ff00");
    }
}
