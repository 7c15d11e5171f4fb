//! Movie search handler.

use crate::errors::PartyError;
use crate::models::{SearchQuery, SearchResponse};
use crate::routes::AppState;
use axum::extract::{Query, State};
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/movies/search?q=
#[instrument(skip_all, name = "party.http.search")]
pub async fn search_movies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, PartyError> {
    let movies = state.coordinator.search_movies(&params.q).await?;

    Ok(Json(SearchResponse {
        query: params.q.trim().to_string(),
        movies,
    }))
}
