//! Configuration for the retrieval pipeline and its collaborator services.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::retry::{MAX_RETRIES_LIMIT, RetryPolicy};

/// Instruction prefix sent with every query embedding request.
pub const DEFAULT_EMBEDDING_INSTRUCTION: &str = "Represent the query for retrieval:";

/// Default vector collection holding indexed patient notes.
pub const DEFAULT_COLLECTION: &str = "patient_notes";

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Number of notes returned to the caller.
    pub top_k: usize,
    /// Number of candidates requested from the vector index before entity filtering.
    pub candidate_pool: usize,
    /// Task-framing prefix passed to the embedding service unchanged.
    pub embedding_instruction: String,
    /// Per-request timeout for the embedding service.
    pub embedding_timeout: Duration,
    /// Per-request timeout for the entity-extraction service.
    pub extraction_timeout: Duration,
    /// Upper bound on extracting the entities of one whole text: every chunk
    /// request and every retry. Applies to the query and to each candidate.
    pub extraction_budget: Duration,
    /// Longest text (in characters) sent to the extraction service in one request.
    pub max_chunk_chars: usize,
    /// Candidates whose entities are extracted concurrently.
    pub extraction_concurrency: usize,
    /// Retry behaviour for transient service failures.
    pub retry: RetryPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            candidate_pool: 20,
            embedding_instruction: DEFAULT_EMBEDDING_INSTRUCTION.to_string(),
            embedding_timeout: Duration::from_secs(60),
            extraction_timeout: Duration::from_secs(300),
            extraction_budget: Duration::from_secs(900),
            max_chunk_chars: 512,
            extraction_concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the number of notes returned to the caller.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set how many vector-search candidates are entity-checked.
    pub fn candidate_pool(mut self, n: usize) -> Self {
        self.config.candidate_pool = n;
        self
    }

    /// Set the embedding instruction prefix.
    pub fn embedding_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.embedding_instruction = instruction.into();
        self
    }

    /// Set the embedding service timeout.
    pub fn embedding_timeout(mut self, timeout: Duration) -> Self {
        self.config.embedding_timeout = timeout;
        self
    }

    /// Set the extraction service timeout.
    pub fn extraction_timeout(mut self, timeout: Duration) -> Self {
        self.config.extraction_timeout = timeout;
        self
    }

    /// Set the whole-text extraction budget.
    pub fn extraction_budget(mut self, budget: Duration) -> Self {
        self.config.extraction_budget = budget;
        self
    }

    /// Set the extraction chunk length in characters.
    pub fn max_chunk_chars(mut self, chars: usize) -> Self {
        self.config.max_chunk_chars = chars;
        self
    }

    /// Set the extraction fan-out limit.
    pub fn extraction_concurrency(mut self, n: usize) -> Self {
        self.config.extraction_concurrency = n;
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `top_k`, `candidate_pool`, `max_chunk_chars` or `extraction_concurrency` is zero
    /// - either timeout is zero
    /// - `extraction_budget` is shorter than `extraction_timeout`
    /// - `retry.max_retries` exceeds [`MAX_RETRIES_LIMIT`]
    pub fn build(self) -> Result<RagConfig> {
        let c = &self.config;
        if c.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if c.candidate_pool == 0 {
            return Err(RagError::ConfigError(
                "candidate_pool must be greater than zero".to_string(),
            ));
        }
        if c.max_chunk_chars == 0 {
            return Err(RagError::ConfigError(
                "max_chunk_chars must be greater than zero".to_string(),
            ));
        }
        if c.extraction_concurrency == 0 {
            return Err(RagError::ConfigError(
                "extraction_concurrency must be greater than zero".to_string(),
            ));
        }
        if c.embedding_timeout.is_zero() || c.extraction_timeout.is_zero() {
            return Err(RagError::ConfigError("service timeouts must be non-zero".to_string()));
        }
        if c.extraction_budget < c.extraction_timeout {
            return Err(RagError::ConfigError(format!(
                "extraction_budget ({:?}) must not be shorter than extraction_timeout ({:?})",
                c.extraction_budget, c.extraction_timeout
            )));
        }
        if c.retry.max_retries > MAX_RETRIES_LIMIT {
            return Err(RagError::ConfigError(format!(
                "retry.max_retries ({}) must not exceed {MAX_RETRIES_LIMIT}",
                c.retry.max_retries
            )));
        }
        Ok(self.config)
    }
}

/// Where the collaborator services live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceEndpoints {
    /// Base URL of the embedding service (`POST {base}/embeddings`).
    pub embedding_url: String,
    /// Base URL of the entity-extraction service (`POST {base}/extract_entities`).
    pub ner_url: String,
    /// URL of the vector index (gRPC endpoint for Qdrant).
    pub vector_index_url: String,
    /// Collection holding the note vectors.
    pub collection: String,
}

impl ServiceEndpoints {
    /// Read endpoints from `EMBEDDING_SERVICE_URL`, `NER_SERVICE_URL`,
    /// `VECTOR_INDEX_URL` and `NOTES_COLLECTION` (optional).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] naming the first missing variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).filter(|v| !v.trim().is_empty()).ok_or_else(|| {
                RagError::ConfigError(format!("{key} environment variable not set"))
            })
        };
        let endpoints = Self {
            embedding_url: required("EMBEDDING_SERVICE_URL")?,
            ner_url: required("NER_SERVICE_URL")?,
            vector_index_url: required("VECTOR_INDEX_URL")?,
            collection: lookup("NOTES_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
        };
        endpoints.validate()?;
        Ok(endpoints)
    }

    /// Check that every URL is an http(s) URL.
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("embedding_url", &self.embedding_url),
            ("ner_url", &self.ner_url),
            ("vector_index_url", &self.vector_index_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(RagError::ConfigError(format!(
                    "{name} must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if self.collection.trim().is_empty() {
            return Err(RagError::ConfigError("collection must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::builder().build().unwrap();
        assert_eq!(config, RagConfig::default());
        assert_eq!(config.embedding_timeout, Duration::from_secs(60));
        assert_eq!(config.extraction_timeout, Duration::from_secs(300));
    }

    #[test]
    fn rejects_zero_top_k() {
        let err = RagConfig::builder().top_k(0).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn rejects_unbounded_retries() {
        let policy = RetryPolicy { max_retries: 10, ..RetryPolicy::default() };
        assert!(RagConfig::builder().retry(policy).build().is_err());
    }

    #[test]
    fn extraction_budget_covers_at_least_one_request() {
        let err = RagConfig::builder()
            .extraction_timeout(Duration::from_secs(10))
            .extraction_budget(Duration::from_secs(5))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("extraction_budget"));

        let config = RagConfig::builder()
            .extraction_timeout(Duration::from_secs(1))
            .extraction_budget(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(config.extraction_budget, Duration::from_secs(5));
    }

    #[test]
    fn endpoints_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("EMBEDDING_SERVICE_URL", "http://localhost:8004"),
            ("NER_SERVICE_URL", "http://ner:8000"),
            ("VECTOR_INDEX_URL", "http://localhost:6334"),
        ]
        .into_iter()
        .collect();
        let endpoints =
            ServiceEndpoints::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(endpoints.collection, DEFAULT_COLLECTION);
        assert_eq!(endpoints.ner_url, "http://ner:8000");
    }

    #[test]
    fn missing_endpoint_is_a_config_error() {
        let err = ServiceEndpoints::from_lookup(|_| None).unwrap_err();
        assert!(err.to_string().contains("EMBEDDING_SERVICE_URL"));
    }
}
