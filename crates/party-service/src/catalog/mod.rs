//! Movie catalog collaborator.
//!
//! The coordinator resolves suggestions and searches through [`MovieCatalog`].
//! Calls are bounded by the coordinator's catalog timeout. Every failure,
//! including an unknown or malformed movie id, is `PartyError::Upstream`.

pub mod tmdb;

pub use tmdb::TmdbClient;

use crate::errors::PartyError;
use crate::models::Movie;

/// Trait for movie catalog operations (enables mocking).
#[async_trait::async_trait]
pub trait MovieCatalog: Send + Sync {
    /// Free-text title search.
    async fn search_movies(&self, query: &str) -> Result<Vec<Movie>, PartyError>;

    /// Resolves one movie by catalog id.
    ///
    /// Returns `PartyError::Upstream` when the catalog has no such movie.
    async fn get_movie_details(&self, movie_id: &str) -> Result<Movie, PartyError>;
}

/// Mock movie catalog for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-process catalog with a fixed movie list.
    pub struct MockMovieCatalog {
        movies: Vec<Movie>,
        delay: Option<Duration>,
        return_error: bool,
        call_count: AtomicUsize,
    }

    impl MockMovieCatalog {
        /// Catalog serving `movies`.
        pub fn with_movies(movies: Vec<Movie>) -> Self {
            Self {
                movies,
                delay: None,
                return_error: false,
                call_count: AtomicUsize::new(0),
            }
        }

        /// Catalog with a handful of well-known titles, ids "1" through "5".
        pub fn classics() -> Self {
            let titles = [
                ("1", "Alien", "1979", "/alien.jpg"),
                ("2", "Heat", "1995", "/heat.jpg"),
                ("3", "Jaws", "1975", "/jaws.jpg"),
                ("4", "Up", "2009", "/up.jpg"),
                ("5", "Her", "2013", "/her.jpg"),
            ];
            Self::with_movies(
                titles
                    .into_iter()
                    .map(|(id, title, year, poster)| Movie {
                        id: id.to_string(),
                        title: title.to_string(),
                        year: year.to_string(),
                        poster_path: format!("https://image.tmdb.org/t/p/w500{poster}"),
                    })
                    .collect(),
            )
        }

        /// Catalog whose every call fails with an upstream error.
        pub fn failing() -> Self {
            Self {
                return_error: true,
                ..Self::with_movies(Vec::new())
            }
        }

        /// Delays every response, for timeout tests.
        #[must_use]
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        async fn enter(&self) -> Result<(), PartyError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.return_error {
                return Err(PartyError::Upstream("Mock catalog error".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl MovieCatalog for MockMovieCatalog {
        async fn search_movies(&self, query: &str) -> Result<Vec<Movie>, PartyError> {
            self.enter().await?;
            let needle = query.to_lowercase();
            Ok(self
                .movies
                .iter()
                .filter(|m| m.title.to_lowercase().contains(&needle))
                .cloned()
                .collect())
        }

        async fn get_movie_details(&self, movie_id: &str) -> Result<Movie, PartyError> {
            self.enter().await?;
            self.movies
                .iter()
                .find(|m| m.id == movie_id)
                .cloned()
                .ok_or_else(|| PartyError::Upstream(format!("no catalog movie with id {movie_id}")))
        }
    }

}
