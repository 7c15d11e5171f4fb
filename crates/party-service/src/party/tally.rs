//! Instant-runoff tally.
//!
//! Each round every submission counts one vote for its highest-ranked
//! candidate that is still active. A candidate reaching
//! `submissions / 2 + 1` wins. Otherwise the candidate with the lowest tally
//! is eliminated (ties go to the earliest in pool order) and the round is
//! repeated. When one candidate remains it wins whether or not it holds a
//! majority.

use crate::models::Movie;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Tally failure. Both cases are rejected before ranking opens, so seeing one
/// from the coordinator means a corrupted record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TallyError {
    #[error("nomination pool is empty")]
    EmptyPool,

    #[error("no ranking submissions")]
    NoSubmissions,
}

/// Result of a completed tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyOutcome {
    pub winner: Movie,

    /// Candidates eliminated, in elimination order.
    pub eliminated: Vec<Movie>,

    /// Counting rounds performed. Zero when the pool has a single candidate.
    pub rounds: u32,
}

/// Computes the winner of `pool` from ranked `submissions`.
///
/// Deterministic for identical inputs: candidates are always visited in pool
/// order and submissions in key order.
pub fn tally(
    pool: &[Movie],
    submissions: &BTreeMap<String, Vec<String>>,
) -> Result<TallyOutcome, TallyError> {
    let first = pool.first().ok_or(TallyError::EmptyPool)?;

    if pool.len() == 1 {
        return Ok(TallyOutcome {
            winner: first.clone(),
            eliminated: Vec::new(),
            rounds: 0,
        });
    }

    if submissions.is_empty() {
        return Err(TallyError::NoSubmissions);
    }

    let known: HashSet<&str> = pool.iter().map(|m| m.id.as_str()).collect();
    for (participant_id, ranking) in submissions {
        for movie_id in ranking.iter().filter(|id| !known.contains(id.as_str())) {
            warn!(
                target: "party.tally",
                participant_id = %participant_id,
                movie_id = %movie_id,
                "Ranking references a movie outside the pool, ignoring"
            );
        }
    }

    let threshold = submissions.len() / 2 + 1;
    let mut active: Vec<&Movie> = pool.iter().collect();
    let mut eliminated = Vec::new();
    let mut rounds = 0u32;

    loop {
        if let [only] = active.as_slice() {
            debug!(target: "party.tally", winner = %only.id, rounds, "Winner by elimination");
            return Ok(TallyOutcome {
                winner: (*only).clone(),
                eliminated,
                rounds,
            });
        }

        rounds += 1;
        let counts = count_round(&active, submissions);

        debug!(
            target: "party.tally",
            round = rounds,
            remaining = active.len(),
            threshold,
            "Counting round"
        );

        if let Some((winner, votes)) = active
            .iter()
            .zip(counts.iter())
            .find(|(_, votes)| **votes >= threshold)
        {
            debug!(target: "party.tally", winner = %winner.id, votes, rounds, "Majority winner");
            return Ok(TallyOutcome {
                winner: (*winner).clone(),
                eliminated,
                rounds,
            });
        }

        // min_by_key keeps the first minimum, which is the earliest in pool order.
        let Some((loser, lowest)) = counts.into_iter().enumerate().min_by_key(|(_, v)| *v) else {
            return Err(TallyError::EmptyPool);
        };
        let removed = active.remove(loser);
        debug!(target: "party.tally", movie_id = %removed.id, votes = lowest, "Eliminated");
        eliminated.push(removed.clone());
    }
}

/// Counts first still-active choices. `counts[i]` belongs to `active[i]`.
fn count_round(active: &[&Movie], submissions: &BTreeMap<String, Vec<String>>) -> Vec<usize> {
    let mut counts = vec![0usize; active.len()];

    for ranking in submissions.values() {
        let choice = ranking
            .iter()
            .find_map(|id| active.iter().position(|m| m.id == *id));
        if let Some(slot) = choice.and_then(|index| counts.get_mut(index)) {
            *slot += 1;
        }
    }

    counts
}
