//! `PartyCoordinator` - every party state transition goes through here.
//!
//! Each mutating operation runs one critical section per party id:
//!
//! 1. Acquire the party lock (single attempt, `Conflict` when held)
//! 2. Read the party fresh from the store
//! 3. Validate phase and role
//! 4. Mutate in memory
//! 5. Persist once
//! 6. Release the lock
//!
//! The lock is released on every exit path. A [`SessionLockGuard`] dropped
//! without an explicit release (task cancelled mid-operation) schedules the
//! release on the runtime.

use super::auth::{AuthToken, TokenAuthority};
use super::tally::tally;
use crate::catalog::MovieCatalog;
use crate::errors::PartyError;
use crate::models::{Movie, Nomination, Participant, Party, Phase, Vote};
use crate::observability::metrics;
use crate::store::{PartyStore, SessionLock, SessionStore};
use common::types::ParticipantId;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Default lock expiry. Must exceed the catalog timeout.
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(15);

/// Default bound on one catalog round trip.
pub const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinator tuning.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub lock_duration: Duration,
    pub catalog_timeout: Duration,

    /// Reject votes that arrive after the nomination resolved instead of
    /// ignoring them.
    pub strict_late_votes: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            lock_duration: DEFAULT_LOCK_DURATION,
            catalog_timeout: DEFAULT_CATALOG_TIMEOUT,
            strict_late_votes: false,
        }
    }
}

/// Result of `create_session`.
#[derive(Debug, Clone)]
pub struct CreatedParty {
    pub party: Party,
    pub host_id: String,
    pub auth_token: AuthToken,
}

/// Result of `join_session`.
#[derive(Debug, Clone)]
pub struct JoinedParty {
    pub participant: Participant,
    pub party: Party,
    pub auth_token: AuthToken,
}

/// What a critical section wants written back.
enum Commit {
    Save(Party),
    Unchanged(Party),
}

/// Held party lock.
///
/// Call [`release`](Self::release) on the normal path. Dropping the guard
/// unreleased spawns the release instead.
struct SessionLockGuard {
    locks: Arc<dyn SessionLock>,
    party_id: String,
    released: bool,
}

impl SessionLockGuard {
    async fn release(mut self) {
        if let Err(e) = self.locks.release_lock(&self.party_id).await {
            // The lock still expires on its own after lock_duration.
            warn!(
                target: "party.coordinator",
                error = %e,
                party_id = %self.party_id,
                "Failed to release party lock"
            );
        }
        self.released = true;
    }
}

impl Drop for SessionLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let locks = Arc::clone(&self.locks);
        let party_id = std::mem::take(&mut self.party_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = locks.release_lock(&party_id).await {
                        warn!(
                            target: "party.coordinator",
                            error = %e,
                            party_id = %party_id,
                            "Failed to release abandoned party lock"
                        );
                    }
                });
            }
            Err(_) => {
                warn!(
                    target: "party.coordinator",
                    party_id = %party_id,
                    "No runtime to release abandoned party lock, waiting for expiry"
                );
            }
        }
    }
}

/// Orchestrates party state transitions over the store, lock, token
/// authority and movie catalog.
pub struct PartyCoordinator {
    sessions: Arc<dyn SessionStore>,
    locks: Arc<dyn SessionLock>,
    tokens: TokenAuthority,
    catalog: Arc<dyn MovieCatalog>,
    settings: CoordinatorSettings,
}

impl PartyCoordinator {
    /// Builds a coordinator with all persistence backed by `store`.
    pub fn new<S>(store: Arc<S>, catalog: Arc<dyn MovieCatalog>, settings: CoordinatorSettings) -> Self
    where
        S: PartyStore + 'static,
    {
        let sessions: Arc<dyn SessionStore> = store.clone();
        let locks: Arc<dyn SessionLock> = store.clone();
        Self {
            sessions,
            locks,
            tokens: TokenAuthority::new(store),
            catalog,
            settings,
        }
    }

    /// Replaces the token authority, e.g. one with a custom lifetime.
    #[must_use]
    pub fn with_token_authority(mut self, tokens: TokenAuthority) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Liveness of the backing store.
    pub async fn ping_store(&self) -> Result<(), PartyError> {
        self.sessions.ping().await
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Creates a party in the lobby with a host participant and issues the
    /// host's token.
    #[instrument(skip_all)]
    pub async fn create_session(&self, name: &str) -> Result<CreatedParty, PartyError> {
        let start = Instant::now();
        let result = self.create_session_inner(name).await;
        record("create_session", &result, start);
        result
    }

    async fn create_session_inner(&self, name: &str) -> Result<CreatedParty, PartyError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PartyError::Validation("party name cannot be empty".to_string()));
        }

        let (party, host_id) = Party::new(name);
        let host = party
            .participant(&host_id)
            .ok_or_else(|| PartyError::Internal("host missing from new party".to_string()))?;

        // The credential is written first so a stored party always has a host
        // who can act on it.
        let auth_token = self
            .tokens
            .create_token(&party.id, &host.id, &host.username, true)
            .await?;
        if let Err(e) = self.sessions.save_party(&party).await {
            self.discard_token(&auth_token).await;
            return Err(e);
        }

        info!(target: "party.coordinator", party_id = %party.id, "Party created");
        Ok(CreatedParty {
            party,
            host_id,
            auth_token,
        })
    }

    /// Reads the current party.
    #[instrument(skip_all, fields(party_id = %party_id))]
    pub async fn get_session(&self, party_id: &str) -> Result<Party, PartyError> {
        self.load(party_id).await
    }

    /// Adds a non-host participant and issues their token.
    #[instrument(skip_all, fields(party_id = %party_id))]
    pub async fn join_session(&self, party_id: &str, username: &str) -> Result<JoinedParty, PartyError> {
        let start = Instant::now();
        let result = self.join_session_inner(party_id, username).await;
        record("join_session", &result, start);
        result
    }

    async fn join_session_inner(&self, party_id: &str, username: &str) -> Result<JoinedParty, PartyError> {
        // Uniqueness is exact: the name is stored as given.
        if username.trim().is_empty() {
            return Err(PartyError::Validation("username cannot be empty".to_string()));
        }
        let username = username.to_string();

        // Fail fast before any token is written for a party that is gone.
        self.load(party_id).await?;

        // A participant is only ever persisted together with a live
        // credential; the token is revoked if the join does not commit.
        let user_id = ParticipantId::new().to_string();
        let auth_token = self
            .tokens
            .create_token(party_id, &user_id, &username, false)
            .await?;

        let joined = self
            .locked("join_session", party_id, |mut party| {
                let user_id = user_id.clone();
                let username = username.clone();
                async move {
                    if party.has_username(&username) {
                        return Err(PartyError::Conflict(
                            "username already taken in this party".to_string(),
                        ));
                    }
                    party.add_participant(user_id, username, false);
                    Ok(Commit::Save(party))
                }
            })
            .await;
        let party = match joined {
            Ok(party) => party,
            Err(e) => {
                self.discard_token(&auth_token).await;
                return Err(e);
            }
        };

        let participant = party
            .participant(&user_id)
            .cloned()
            .ok_or_else(|| PartyError::Internal("joined participant missing".to_string()))?;

        info!(
            target: "party.coordinator",
            party_id = %party.id,
            participants = party.participant_count(),
            "Participant joined"
        );
        Ok(JoinedParty {
            participant,
            party,
            auth_token,
        })
    }

    /// Host opens nominations.
    #[instrument(skip_all, fields(party_id = %party_id))]
    pub async fn start_nomination(&self, party_id: &str, caller_id: &str) -> Result<Party, PartyError> {
        self.mutate("start_nomination", party_id, |mut party| async move {
            if !party.is_host(caller_id) {
                return Err(PartyError::Authorization(
                    "only the host can start nominations".to_string(),
                ));
            }
            if party.phase != Phase::Lobby {
                return Err(PartyError::PhaseViolation(
                    "party must be in lobby phase to start nominations".to_string(),
                ));
            }

            party.phase = Phase::Nominating;
            party.nomination_pool.clear();
            party.current_nomination = None;
            Ok(Commit::Save(party))
        })
        .await
    }

    /// Puts a movie up for a yay/nay vote.
    #[instrument(skip_all, fields(party_id = %party_id, movie_ref = %movie_ref))]
    pub async fn suggest_movie(
        &self,
        party_id: &str,
        caller_id: &str,
        movie_ref: &str,
    ) -> Result<Party, PartyError> {
        self.mutate("suggest_movie", party_id, |mut party| async move {
            if party.phase != Phase::Nominating {
                return Err(PartyError::PhaseViolation("nominations are not open".to_string()));
            }
            if !party.is_participant(caller_id) {
                return Err(PartyError::Authorization(
                    "caller is not a participant of this party".to_string(),
                ));
            }
            if party.current_nomination.is_some() {
                return Err(PartyError::Conflict(
                    "another nomination is already in progress".to_string(),
                ));
            }
            if party.pool_contains(movie_ref) {
                return Err(PartyError::Conflict(
                    "movie is already in the nomination pool".to_string(),
                ));
            }

            let movie = self
                .catalog_call("get_movie_details", self.catalog.get_movie_details(movie_ref))
                .await?;

            debug!(target: "party.coordinator", movie_id = %movie.id, "Nomination opened");
            party.current_nomination = Some(Nomination::new(movie));
            Ok(Commit::Save(party))
        })
        .await
    }

    /// Records a vote on the nomination in flight and resolves it once every
    /// participant has voted.
    #[instrument(skip_all, fields(party_id = %party_id))]
    pub async fn vote_nomination(
        &self,
        party_id: &str,
        caller_id: &str,
        vote: &str,
    ) -> Result<Party, PartyError> {
        let strict = self.settings.strict_late_votes;
        self.mutate("vote_nomination", party_id, |mut party| async move {
            if !party.is_participant(caller_id) {
                return Err(PartyError::Authorization(
                    "caller is not a participant of this party".to_string(),
                ));
            }
            let vote = Vote::parse(vote)
                .ok_or_else(|| PartyError::Validation("vote must be 'yay' or 'nay'".to_string()))?;

            let participant_count = party.participant_count();
            let Some(nomination) = party.current_nomination.as_mut() else {
                if strict {
                    return Err(PartyError::Conflict("no nomination in progress".to_string()));
                }
                warn!(
                    target: "party.coordinator",
                    party_id = %party.id,
                    participant_id = %caller_id,
                    "Late vote with no nomination in progress, ignoring"
                );
                return Ok(Commit::Unchanged(party));
            };

            nomination.voters.insert(caller_id.to_string(), vote);

            if nomination.voters.len() >= participant_count {
                let yay = nomination.yay_count();
                let accepted = yay > participant_count / 2;
                if let Some(resolved) = party.current_nomination.take() {
                    info!(
                        target: "party.coordinator",
                        party_id = %party.id,
                        movie_id = %resolved.movie.id,
                        yay,
                        participants = participant_count,
                        accepted,
                        "Nomination resolved"
                    );
                    if accepted {
                        party.nomination_pool.push(resolved.movie);
                    }
                }
            }

            Ok(Commit::Save(party))
        })
        .await
    }

    /// Host closes nominations and opens ranking.
    #[instrument(skip_all, fields(party_id = %party_id))]
    pub async fn finalize_nominations(&self, party_id: &str, caller_id: &str) -> Result<Party, PartyError> {
        self.mutate("finalize_nominations", party_id, |mut party| async move {
            if !party.is_host(caller_id) {
                return Err(PartyError::Authorization(
                    "only the host can finalize nominations".to_string(),
                ));
            }
            if party.phase != Phase::Nominating {
                return Err(PartyError::PhaseViolation(
                    "party is not in nominating phase".to_string(),
                ));
            }
            if party.nomination_pool.is_empty() {
                return Err(PartyError::Validation(
                    "no movies have been nominated".to_string(),
                ));
            }

            party.phase = Phase::Ranking;
            party.current_nomination = None;
            party.submissions = BTreeMap::new();
            Ok(Commit::Save(party))
        })
        .await
    }

    /// Stores a participant's full ranking of the pool. The last submission
    /// triggers the tally.
    #[instrument(skip_all, fields(party_id = %party_id))]
    pub async fn submit_ranking(
        &self,
        party_id: &str,
        caller_id: &str,
        ranks: Vec<String>,
    ) -> Result<Party, PartyError> {
        self.mutate("submit_ranking", party_id, |mut party| async move {
            if party.phase != Phase::Ranking {
                return Err(PartyError::PhaseViolation("ranking is not open".to_string()));
            }
            if !party.is_participant(caller_id) {
                return Err(PartyError::Authorization(
                    "caller is not a participant of this party".to_string(),
                ));
            }
            validate_ranking(&party.nomination_pool, &ranks)?;

            party.submissions.insert(caller_id.to_string(), ranks);

            if party.submissions.len() == party.participant_count() {
                let outcome = tally(&party.nomination_pool, &party.submissions)
                    .map_err(|e| PartyError::Internal(format!("tally failed: {e}")))?;

                metrics::record_tally_rounds(outcome.rounds);
                info!(
                    target: "party.coordinator",
                    party_id = %party.id,
                    winner = %outcome.winner.id,
                    rounds = outcome.rounds,
                    eliminated = outcome.eliminated.len(),
                    "Party finished"
                );
                party.winner = Some(outcome.winner);
                party.phase = Phase::Finished;
            }

            Ok(Commit::Save(party))
        })
        .await
    }

    /// Catalog search bounded by the catalog timeout.
    #[instrument(skip_all)]
    pub async fn search_movies(&self, query: &str) -> Result<Vec<Movie>, PartyError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PartyError::Validation("search query cannot be empty".to_string()));
        }
        self.catalog_call("search_movies", self.catalog.search_movies(query))
            .await
    }

    // ------------------------------------------------------------------------
    // Critical section plumbing
    // ------------------------------------------------------------------------

    async fn load(&self, party_id: &str) -> Result<Party, PartyError> {
        self.sessions
            .get_party(party_id)
            .await?
            .ok_or_else(|| PartyError::NotFound("party not found".to_string()))
    }

    /// `locked` plus operation metrics.
    async fn mutate<F, Fut>(&self, operation: &'static str, party_id: &str, body: F) -> Result<Party, PartyError>
    where
        F: FnOnce(Party) -> Fut,
        Fut: Future<Output = Result<Commit, PartyError>>,
    {
        let start = Instant::now();
        let result = self.locked(operation, party_id, body).await;
        record(operation, &result, start);
        result
    }

    /// Runs `body` on a fresh read of the party while holding its lock, and
    /// persists the result when asked to.
    async fn locked<F, Fut>(&self, operation: &'static str, party_id: &str, body: F) -> Result<Party, PartyError>
    where
        F: FnOnce(Party) -> Fut,
        Fut: Future<Output = Result<Commit, PartyError>>,
    {
        let guard = self.acquire(operation, party_id).await?;

        let result = async {
            let party = self.load(party_id).await?;
            match body(party).await? {
                Commit::Save(mut party) => {
                    party.revision += 1;
                    self.sessions.save_party(&party).await?;
                    Ok(party)
                }
                Commit::Unchanged(party) => Ok(party),
            }
        }
        .await;

        guard.release().await;
        result
    }

    async fn acquire(&self, operation: &'static str, party_id: &str) -> Result<SessionLockGuard, PartyError> {
        let acquired = self
            .locks
            .acquire_lock(party_id, self.settings.lock_duration)
            .await?;

        if !acquired {
            metrics::record_lock_contention(operation);
            debug!(target: "party.coordinator", party_id = %party_id, operation, "Party lock contended");
            return Err(PartyError::Conflict(
                "party is currently being modified, please retry".to_string(),
            ));
        }

        Ok(SessionLockGuard {
            locks: Arc::clone(&self.locks),
            party_id: party_id.to_string(),
            released: false,
        })
    }

    /// Best-effort revoke of a token whose participant was never committed.
    async fn discard_token(&self, token: &AuthToken) {
        if let Err(e) = self.tokens.revoke_token(&token.token).await {
            warn!(
                target: "party.coordinator",
                error = %e,
                party_id = %token.party_id,
                "Failed to revoke uncommitted token"
            );
        }
    }

    async fn catalog_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, PartyError>>,
    ) -> Result<T, PartyError> {
        let start = Instant::now();
        let timeout = self.settings.catalog_timeout;

        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PartyError::Upstream(format!(
                "catalog {operation} timed out after {}s",
                timeout.as_secs()
            ))),
        };

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.error_code(),
        };
        metrics::record_catalog_request(operation, status, start.elapsed());
        result
    }
}

/// A ranking must order the whole pool exactly once.
fn validate_ranking(pool: &[Movie], ranks: &[String]) -> Result<(), PartyError> {
    if ranks.len() != pool.len() {
        return Err(PartyError::Validation(format!(
            "ranking must include all {} nominated movies",
            pool.len()
        )));
    }

    let mut seen = HashSet::with_capacity(ranks.len());
    for movie_id in ranks {
        if !pool.iter().any(|m| m.id == *movie_id) {
            return Err(PartyError::Validation(format!(
                "invalid movie id in ranking: {movie_id}"
            )));
        }
        if !seen.insert(movie_id.as_str()) {
            return Err(PartyError::Validation(format!(
                "movie ranked more than once: {movie_id}"
            )));
        }
    }

    Ok(())
}

fn record<T>(operation: &'static str, result: &Result<T, PartyError>, start: Instant) {
    let status = match result {
        Ok(_) => "success",
        Err(e) => e.error_code(),
    };
    metrics::record_operation(operation, status, start.elapsed());
}
