//! In-memory session store.
//!
//! Mirrors the Redis semantics the coordinator relies on: records are stored
//! serialized, lock acquisition is set-if-absent with expiry, and release is
//! unconditional. Lock expiry uses `tokio::time::Instant` so paused-clock
//! tests can advance past it.

use super::{SessionLock, SessionStore, TokenStore};
use crate::errors::PartyError;
use crate::models::Party;
use crate::party::auth::AuthToken;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Cloneable in-memory store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
    saves: Arc<AtomicUsize>,
    fail_saves: Arc<AtomicBool>,
    fail_token_saves: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct Inner {
    parties: HashMap<String, String>,
    locks: HashMap<String, Instant>,
    tokens: HashMap<String, String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful `save_party` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Makes every subsequent `save_party` fail with a store error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `save_token` fail with a store error.
    pub fn set_fail_token_saves(&self, fail: bool) {
        self.fail_token_saves.store(fail, Ordering::SeqCst);
    }

    /// Whether an unexpired lock is held for the party.
    pub fn is_locked(&self, party_id: &str) -> bool {
        self.inner()
            .locks
            .get(party_id)
            .is_some_and(|expires| *expires > Instant::now())
    }

    pub fn party_count(&self) -> usize {
        self.inner().parties.len()
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.inner().tokens.contains_key(token)
    }

    pub fn token_count(&self) -> usize {
        self.inner().tokens.len()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn get_party(&self, party_id: &str) -> Result<Option<Party>, PartyError> {
        let raw = self.inner().parties.get(party_id).cloned();
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(PartyError::from)
    }

    async fn save_party(&self, party: &Party) -> Result<(), PartyError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PartyError::Store("simulated save failure".to_string()));
        }

        let json = serde_json::to_string(party)?;
        self.inner().parties.insert(party.id.clone(), json);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_party(&self, party_id: &str) -> Result<(), PartyError> {
        self.inner().parties.remove(party_id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), PartyError> {
        Ok(())
    }
}

#[async_trait]
impl SessionLock for InMemoryStore {
    async fn acquire_lock(&self, party_id: &str, duration: Duration) -> Result<bool, PartyError> {
        let now = Instant::now();
        let mut inner = self.inner();

        match inner.locks.get(party_id) {
            Some(expires) if *expires > now => Ok(false),
            _ => {
                inner.locks.insert(party_id.to_string(), now + duration);
                Ok(true)
            }
        }
    }

    async fn release_lock(&self, party_id: &str) -> Result<(), PartyError> {
        self.inner().locks.remove(party_id);
        Ok(())
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn save_token(&self, token: &AuthToken) -> Result<(), PartyError> {
        if self.fail_token_saves.load(Ordering::SeqCst) {
            return Err(PartyError::Store("simulated token save failure".to_string()));
        }

        let json = serde_json::to_string(token)?;
        self.inner().tokens.insert(token.token.clone(), json);
        Ok(())
    }

    async fn get_token(&self, token: &str) -> Result<Option<AuthToken>, PartyError> {
        let raw = self.inner().tokens.get(token).cloned();
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(PartyError::from)
    }

    async fn delete_token(&self, token: &str) -> Result<(), PartyError> {
        self.inner().tokens.remove(token);
        Ok(())
    }
}
