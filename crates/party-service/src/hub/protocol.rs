//! WebSocket wire protocol.
//!
//! Every frame is a JSON envelope `{"type": <string>, "payload": <object>}`.
//! `payload` may be omitted for types that carry none. Inbound frames parse
//! into the closed [`ClientMessage`] enum; outbound frames serialize from
//! [`ServerMessage`].

use crate::models::{Movie, Party};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Inbound envelope failure. The text is safe to send back to the client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid message format")]
    Malformed,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid {message_type} payload")]
    InvalidPayload { message_type: &'static str },
}

/// Client to server messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Ping,
    SearchMovies { query: String },
    SuggestMovie { tmdb_id: String },
    VoteNomination { vote: String },
    FinalizeNominations,
    SubmitRanking { ranks: Vec<String> },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Deserialize)]
struct SearchMoviesPayload {
    query: String,
}

/// Catalog ids arrive either as strings or bare integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum MovieRef {
    Text(String),
    Number(u64),
}

#[derive(Deserialize)]
struct SuggestMoviePayload {
    tmdb_id: MovieRef,
}

#[derive(Deserialize)]
struct VotePayload {
    vote: String,
}

#[derive(Deserialize)]
struct SubmitRankingPayload {
    ranks: Vec<String>,
}

impl ClientMessage {
    /// Parses one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(|_| ProtocolError::Malformed)?;

        match envelope.message_type.as_str() {
            "ping" => Ok(ClientMessage::Ping),
            "finalize_nominations" => Ok(ClientMessage::FinalizeNominations),
            "search_movies" => {
                let p: SearchMoviesPayload = payload("search_movies", envelope.payload)?;
                Ok(ClientMessage::SearchMovies { query: p.query })
            }
            "suggest_movie" => {
                let p: SuggestMoviePayload = payload("suggest_movie", envelope.payload)?;
                let tmdb_id = match p.tmdb_id {
                    MovieRef::Text(id) => id,
                    MovieRef::Number(id) => id.to_string(),
                };
                Ok(ClientMessage::SuggestMovie { tmdb_id })
            }
            "vote_nomination" => {
                let p: VotePayload = payload("vote_nomination", envelope.payload)?;
                Ok(ClientMessage::VoteNomination { vote: p.vote })
            }
            "submit_ranking" => {
                let p: SubmitRankingPayload = payload("submit_ranking", envelope.payload)?;
                Ok(ClientMessage::SubmitRanking { ranks: p.ranks })
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }

    /// Wire name of the message type, also used as a metric label.
    pub fn message_type(&self) -> &'static str {
        match self {
            ClientMessage::Ping => "ping",
            ClientMessage::SearchMovies { .. } => "search_movies",
            ClientMessage::SuggestMovie { .. } => "suggest_movie",
            ClientMessage::VoteNomination { .. } => "vote_nomination",
            ClientMessage::FinalizeNominations => "finalize_nominations",
            ClientMessage::SubmitRanking { .. } => "submit_ranking",
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    message_type: &'static str,
    raw: Option<Value>,
) -> Result<T, ProtocolError> {
    let raw = raw.ok_or(ProtocolError::InvalidPayload { message_type })?;
    serde_json::from_value(raw).map_err(|_| ProtocolError::InvalidPayload { message_type })
}

/// Server to client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong { timestamp: i64 },
    SearchResults { query: String, movies: Vec<Movie> },
    PartyUpdate { party: Party },
    Error { message: String },
}

impl ServerMessage {
    pub fn pong() -> Self {
        ServerMessage::Pong {
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serializes to a text frame body.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payloadless_types() {
        assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#), Ok(ClientMessage::Ping));
        assert_eq!(
            ClientMessage::parse(r#"{"type":"finalize_nominations","payload":null}"#),
            Ok(ClientMessage::FinalizeNominations)
        );
    }

    #[test]
    fn test_parse_suggest_accepts_string_or_number() {
        let expected = ClientMessage::SuggestMovie {
            tmdb_id: "603".to_string(),
        };
        assert_eq!(
            ClientMessage::parse(r#"{"type":"suggest_movie","payload":{"tmdb_id":"603"}}"#),
            Ok(expected.clone())
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"suggest_movie","payload":{"tmdb_id":603}}"#),
            Ok(expected)
        );
    }

    #[test]
    fn test_parse_submit_ranking() {
        let parsed =
            ClientMessage::parse(r#"{"type":"submit_ranking","payload":{"ranks":["2","1"]}}"#);
        assert_eq!(
            parsed,
            Ok(ClientMessage::SubmitRanking {
                ranks: vec!["2".to_string(), "1".to_string()]
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(ClientMessage::parse("not json"), Err(ProtocolError::Malformed));
        assert_eq!(ClientMessage::parse(r#"{"payload":{}}"#), Err(ProtocolError::Malformed));
        assert_eq!(
            ClientMessage::parse(r#"{"type":"dance"}"#),
            Err(ProtocolError::UnknownType("dance".to_string()))
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"vote_nomination"}"#),
            Err(ProtocolError::InvalidPayload {
                message_type: "vote_nomination"
            })
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"submit_ranking","payload":{"ranks":"1,2"}}"#),
            Err(ProtocolError::InvalidPayload {
                message_type: "submit_ranking"
            })
        );
    }

    #[test]
    fn test_server_message_envelope_shape() {
        let json = serde_json::to_value(ServerMessage::error("nope")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["payload"]["message"], "nope");

        let json = serde_json::to_value(ServerMessage::SearchResults {
            query: "up".to_string(),
            movies: Vec::new(),
        })
        .unwrap();
        assert_eq!(json["type"], "search_results");
        assert_eq!(json["payload"]["query"], "up");
        assert!(json["payload"]["movies"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_pong_carries_timestamp() {
        let json = serde_json::to_value(ServerMessage::pong()).unwrap();
        assert_eq!(json["type"], "pong");
        assert!(json["payload"]["timestamp"].as_i64().unwrap() > 0);
    }
}
