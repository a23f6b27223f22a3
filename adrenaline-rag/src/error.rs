//! Error types for the `adrenaline-rag` crate.

use thiserror::Error;

/// Errors that can occur during retrieval.
///
/// An empty result is not an error: zero candidates, or zero candidates
/// sharing an entity with the query, is reported as an empty
/// [`RetrievalResult`](crate::RetrievalResult).
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing scoping or endpoint configuration. Fatal, never retried.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An external service could not be reached, timed out, or answered with
    /// a server-side failure.
    #[error("Service unavailable ({service}): {message}")]
    ServiceUnavailable {
        /// The collaborator service that failed.
        service: String,
        /// A description of the failure.
        message: String,
    },

    /// An external service answered, but with a response this crate cannot use.
    #[error("Invalid response ({service}): {message}")]
    InvalidResponse {
        /// The collaborator service that produced the response.
        service: String,
        /// A description of the problem.
        message: String,
    },

    /// The caller supplied an unusable argument (e.g. empty text).
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RagError {
    pub(crate) fn unavailable(service: &str, message: impl Into<String>) -> Self {
        Self::ServiceUnavailable { service: service.to_string(), message: message.into() }
    }

    pub(crate) fn invalid_response(service: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse { service: service.to_string(), message: message.into() }
    }

    /// Whether a bounded local retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
