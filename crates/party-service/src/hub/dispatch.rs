//! Maps one inbound client message to a coordinator call.

use super::protocol::{ClientMessage, ServerMessage};
use crate::errors::PartyError;
use crate::models::Party;
use crate::observability::metrics;
use crate::party::PartyCoordinator;
use tracing::{debug, instrument};

/// Where a dispatch result goes.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// To the originating connection only.
    Reply(ServerMessage),

    /// Full state to every connection of the party.
    Broadcast(Party),
}

/// Runs `message` on behalf of `user_id`. Coordinator errors become an
/// `error` reply with the client-safe message.
#[instrument(skip_all, fields(party_id = %party_id, user_id = %user_id, message_type = message.message_type()))]
pub async fn dispatch(
    coordinator: &PartyCoordinator,
    party_id: &str,
    user_id: &str,
    message: ClientMessage,
) -> DispatchOutcome {
    metrics::record_ws_message(message.message_type());

    match run(coordinator, party_id, user_id, message).await {
        Ok(outcome) => outcome,
        Err(e) => {
            e.log_if_internal();
            debug!(target: "party.hub", error_code = e.error_code(), "Message rejected");
            DispatchOutcome::Reply(ServerMessage::error(e.client_message()))
        }
    }
}

async fn run(
    coordinator: &PartyCoordinator,
    party_id: &str,
    user_id: &str,
    message: ClientMessage,
) -> Result<DispatchOutcome, PartyError> {
    let outcome = match message {
        ClientMessage::Ping => DispatchOutcome::Reply(ServerMessage::pong()),
        ClientMessage::SearchMovies { query } => {
            let movies = coordinator.search_movies(&query).await?;
            DispatchOutcome::Reply(ServerMessage::SearchResults {
                query: query.trim().to_string(),
                movies,
            })
        }
        ClientMessage::SuggestMovie { tmdb_id } => DispatchOutcome::Broadcast(
            coordinator.suggest_movie(party_id, user_id, &tmdb_id).await?,
        ),
        ClientMessage::VoteNomination { vote } => DispatchOutcome::Broadcast(
            coordinator.vote_nomination(party_id, user_id, &vote).await?,
        ),
        ClientMessage::FinalizeNominations => DispatchOutcome::Broadcast(
            coordinator.finalize_nominations(party_id, user_id).await?,
        ),
        ClientMessage::SubmitRanking { ranks } => DispatchOutcome::Broadcast(
            coordinator.submit_ranking(party_id, user_id, ranks).await?,
        ),
    };
    Ok(outcome)
}
