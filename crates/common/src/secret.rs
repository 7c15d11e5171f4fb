//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for every credential the party
//! service handles: the Redis connection URL (may embed a password), the
//! movie catalog API key, and participant session tokens on their way into
//! configuration.
//!
//! `SecretString` implements `Debug` with redaction, so a struct that derives
//! `Debug` over a secret field is safe to log via `{:?}` or tracing. The value
//! is zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct CatalogCredentials {
//!     base_url: String,
//!     api_key: SecretString,
//! }
//!
//! let creds = CatalogCredentials {
//!     base_url: "https://api.themoviedb.org/3".to_string(),
//!     api_key: SecretString::from("tmdb-key"),
//! };
//!
//! // Debug output redacts the key.
//! assert!(!format!("{creds:?}").contains("tmdb-key"));
//!
//! // Reading the value is always an explicit call.
//! let key: &str = creds.api_key.expose_secret();
//! assert_eq!(key, "tmdb-key");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
