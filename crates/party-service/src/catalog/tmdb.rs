//! TMDB v3 REST client.
//!
//! Only two endpoints are used: `/search/movie` and `/movie/{id}`. Results are
//! reduced to the four fields a [`Movie`] carries. The API key is passed as a
//! query parameter and never logged.

use super::MovieCatalog;
use crate::errors::PartyError;
use crate::models::Movie;
use common::secret::{ExposeSecret, SecretString};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Default TMDB API base URL.
pub const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Prefix for building full poster URLs from TMDB poster paths.
pub const POSTER_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

/// Default request timeout.
pub const TMDB_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct TmdbMovie {
    id: i64,
    title: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
}

impl From<TmdbMovie> for Movie {
    fn from(raw: TmdbMovie) -> Self {
        let year = raw
            .release_date
            .as_deref()
            .and_then(|date| date.get(..4))
            .unwrap_or_default()
            .to_string();
        let poster_path = raw
            .poster_path
            .filter(|path| !path.is_empty())
            .map(|path| format!("{POSTER_BASE_URL}{path}"))
            .unwrap_or_default();

        Movie {
            id: raw.id.to_string(),
            title: raw.title,
            year,
            poster_path,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TmdbSearchResponse {
    #[serde(default)]
    results: Vec<TmdbMovie>,
}

/// HTTP client for the TMDB API.
#[derive(Clone)]
pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl TmdbClient {
    /// Create a new TMDB client.
    ///
    /// # Errors
    ///
    /// Returns `PartyError::Internal` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, PartyError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "party.catalog.tmdb", error = %e, "Failed to build HTTP client");
                PartyError::Internal(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, PartyError> {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.expose_secret())])
            .query(params)
            .send()
            .await
            .map_err(|e| {
                // reqwest errors include the URL; strip it so the key stays out of logs.
                let e = e.without_url();
                warn!(target: "party.catalog.tmdb", error = %e, path, "TMDB request failed");
                PartyError::Upstream(format!("TMDB request failed: {e}"))
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(target: "party.catalog.tmdb", path, "TMDB has no such resource");
            return Err(PartyError::Upstream("TMDB returned 404 Not Found".to_string()));
        }
        if !status.is_success() {
            warn!(target: "party.catalog.tmdb", status = %status, path, "TMDB returned error status");
            return Err(PartyError::Upstream(format!("TMDB returned {status}")));
        }

        response.json().await.map_err(|e| {
            let e = e.without_url();
            warn!(target: "party.catalog.tmdb", error = %e, path, "Failed to parse TMDB response");
            PartyError::Upstream("TMDB response could not be parsed".to_string())
        })
    }
}

#[async_trait::async_trait]
impl MovieCatalog for TmdbClient {
    #[instrument(skip(self))]
    async fn search_movies(&self, query: &str) -> Result<Vec<Movie>, PartyError> {
        let response: TmdbSearchResponse = self
            .get_json(
                "/search/movie",
                &[("query", query), ("page", "1"), ("include_adult", "false")],
            )
            .await?;

        debug!(
            target: "party.catalog.tmdb",
            results = response.results.len(),
            "TMDB search completed"
        );
        Ok(response.results.into_iter().map(Movie::from).collect())
    }

    #[instrument(skip(self))]
    async fn get_movie_details(&self, movie_id: &str) -> Result<Movie, PartyError> {
        if movie_id.is_empty() || !movie_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PartyError::Upstream(format!(
                "movie id {movie_id:?} is not a TMDB id"
            )));
        }

        let raw: TmdbMovie = self.get_json(&format!("/movie/{movie_id}"), &[]).await?;
        Ok(raw.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TmdbClient {
        TmdbClient::new(
            server.uri(),
            SecretString::from("test-api-key"),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn test_movie_conversion() {
        let movie: Movie = TmdbMovie {
            id: 603,
            title: "The Matrix".to_string(),
            release_date: Some("1999-03-30".to_string()),
            poster_path: Some("/matrix.jpg".to_string()),
        }
        .into();

        assert_eq!(movie.id, "603");
        assert_eq!(movie.year, "1999");
        assert_eq!(movie.poster_path, "https://image.tmdb.org/t/p/w500/matrix.jpg");
    }

    #[test]
    fn test_movie_conversion_missing_fields() {
        let movie: Movie = TmdbMovie {
            id: 1,
            title: "Untitled".to_string(),
            release_date: Some(String::new()),
            poster_path: None,
        }
        .into();

        assert_eq!(movie.year, "");
        assert_eq!(movie.poster_path, "");
    }

    #[tokio::test]
    async fn test_search_movies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .and(query_param("api_key", "test-api-key"))
            .and(query_param("query", "alien"))
            .and(query_param("include_adult", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "page": 1,
                "results": [
                    {"id": 348, "title": "Alien", "release_date": "1979-05-25", "poster_path": "/a.jpg"},
                    {"id": 679, "title": "Aliens", "release_date": "1986-07-18", "poster_path": null}
                ],
                "total_results": 2
            })))
            .expect(1)
            .mount(&server)
            .await;

        let movies = client_for(&server).search_movies("alien").await.unwrap();

        assert_eq!(movies.len(), 2);
        assert_eq!(movies.first().unwrap().id, "348");
        assert_eq!(movies.get(1).unwrap().year, "1986");
    }

    #[tokio::test]
    async fn test_get_movie_details() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/348"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 348, "title": "Alien", "release_date": "1979-05-25", "poster_path": "/a.jpg"
            })))
            .mount(&server)
            .await;

        let movie = client_for(&server).get_movie_details("348").await.unwrap();
        assert_eq!(movie.title, "Alien");
        assert_eq!(movie.year, "1979");
    }

    #[tokio::test]
    async fn test_get_movie_details_not_found_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client_for(&server).get_movie_details("1").await;
        assert!(matches!(result, Err(PartyError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client_for(&server).search_movies("x").await;
        assert!(matches!(result, Err(PartyError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_non_numeric_id_is_rejected_locally() {
        let server = MockServer::start().await;
        let result = client_for(&server).get_movie_details("../etc").await;

        assert!(matches!(result, Err(PartyError::Upstream(_))));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
