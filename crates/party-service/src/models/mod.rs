//! Party service models.
//!
//! The [`Party`] record is the unit of persistence: the coordinator reads it
//! fresh inside every critical section, mutates it in memory and writes it
//! back whole. Field names are the wire and store names.

use chrono::{DateTime, Utc};
use common::types::{ParticipantId, PartyId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Username given to the participant that creates a party.
pub const HOST_USERNAME: &str = "Host";

/// Party phase.
///
/// Phases only advance: Lobby -> Nominating -> Ranking -> Finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Participants are joining.
    Lobby,

    /// Candidates are being suggested and voted into the pool.
    Nominating,

    /// Participants are ranking the pool.
    Ranking,

    /// A winner has been chosen.
    Finished,
}

impl Phase {
    /// Returns the string representation of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lobby => "lobby",
            Phase::Nominating => "nominating",
            Phase::Ranking => "ranking",
            Phase::Finished => "finished",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A yay/nay vote on the nomination in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Yay,
    Nay,
}

impl Vote {
    /// Parses a wire vote. Only the exact lowercase forms are accepted.
    pub fn parse(value: &str) -> Option<Vote> {
        match value {
            "yay" => Some(Vote::Yay),
            "nay" => Some(Vote::Nay),
            _ => None,
        }
    }
}

/// A movie candidate as returned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: String,
    pub title: String,
    pub year: String,
    pub poster_path: String,
}

/// A member of a party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub username: String,
    pub is_host: bool,
}

/// A candidate under yay/nay vote for inclusion in the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nomination {
    pub movie: Movie,

    /// Participant id to vote. A participant voting again overwrites.
    pub voters: BTreeMap<String, Vote>,
}

impl Nomination {
    pub fn new(movie: Movie) -> Self {
        Self {
            movie,
            voters: BTreeMap::new(),
        }
    }

    pub fn yay_count(&self) -> usize {
        self.voters.values().filter(|v| **v == Vote::Yay).count()
    }
}

/// Complete state of one party session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub id: String,
    pub name: String,
    pub phase: Phase,
    pub participants: BTreeMap<String, Participant>,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub current_nomination: Option<Nomination>,

    #[serde(default)]
    pub nomination_pool: Vec<Movie>,

    /// Participant id to ranked list of movie ids.
    #[serde(default)]
    pub submissions: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub winner: Option<Movie>,

    /// Bumped on every committed write; orders `party_update` frames.
    #[serde(default)]
    pub revision: u64,
}

impl Party {
    /// Creates a party in the lobby with its host participant.
    ///
    /// Returns the party and the host's participant id.
    pub fn new(name: impl Into<String>) -> (Self, String) {
        let host_id = ParticipantId::new().to_string();
        let mut party = Self {
            id: PartyId::new().to_string(),
            name: name.into(),
            phase: Phase::Lobby,
            participants: BTreeMap::new(),
            created_at: Utc::now(),
            current_nomination: None,
            nomination_pool: Vec::new(),
            submissions: BTreeMap::new(),
            winner: None,
            revision: 0,
        };
        party.add_participant(host_id.clone(), HOST_USERNAME, true);
        (party, host_id)
    }

    pub fn add_participant(
        &mut self,
        id: impl Into<String>,
        username: impl Into<String>,
        is_host: bool,
    ) -> &Participant {
        let id = id.into();
        self.participants
            .entry(id.clone())
            .or_insert(Participant {
                id,
                username: username.into(),
                is_host,
            })
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn is_participant(&self, id: &str) -> bool {
        self.participants.contains_key(id)
    }

    pub fn is_host(&self, id: &str) -> bool {
        self.participant(id).is_some_and(|p| p.is_host)
    }

    pub fn host(&self) -> Option<&Participant> {
        self.participants.values().find(|p| p.is_host)
    }

    /// Exact, case-sensitive username lookup.
    pub fn has_username(&self, username: &str) -> bool {
        self.participants.values().any(|p| p.username == username)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn pool_contains(&self, movie_id: &str) -> bool {
        self.nomination_pool.iter().any(|m| m.id == movie_id)
    }
}

// ============================================================================
// HTTP API Models
// ============================================================================

/// Request body for `POST /api/party`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreatePartyRequest {
    pub name: String,
}

/// Response body for `POST /api/party`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePartyResponse {
    pub party_id: String,
    pub host_id: String,
    pub party: Party,
    pub auth_token: String,
}

/// Request body for `POST /api/party/:id/join`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JoinPartyRequest {
    pub username: String,
}

/// Response body for `POST /api/party/:id/join`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinPartyResponse {
    pub user_id: String,
    pub participant: Participant,
    pub party: Party,
    pub auth_token: String,
}

/// Query string for `GET /api/movies/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Response body for `GET /api/movies/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub movies: Vec<Movie>,
}

/// Response body for `GET /ready`.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<&'static str>,

    /// Generic, no infrastructure details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
