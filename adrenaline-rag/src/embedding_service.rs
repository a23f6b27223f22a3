//! HTTP client for the embedding service.
//!
//! Speaks the service's `POST /embeddings` contract:
//! `{texts: [string], instruction: string}` → `{embeddings: [[f32]]}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{RagConfig, ServiceEndpoints};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::http;
use crate::retry::RetryPolicy;

const SERVICE: &str = "embedding";

/// An [`EmbeddingProvider`] backed by the embedding microservice.
///
/// Holds one pooled `reqwest::Client` for the lifetime of the process.
/// Transient failures are retried according to the configured
/// [`RetryPolicy`] (one retry by default), never indefinitely.
///
/// # Example
///
/// ```rust,ignore
/// use adrenaline_rag::HttpEmbeddingClient;
///
/// let client = HttpEmbeddingClient::new("http://localhost:8004", Duration::from_secs(60))?;
/// let vector = client.embed("chest pain", "Represent the query for retrieval:").await?;
/// ```
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpEmbeddingClient {
    /// Create a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the URL is not http(s).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::build_client(SERVICE, timeout)?,
            url: http::endpoint_url(SERVICE, base_url, "embeddings")?,
            retry: RetryPolicy::default(),
        })
    }

    /// Create a client from endpoint and pipeline configuration.
    pub fn from_config(endpoints: &ServiceEndpoints, config: &RagConfig) -> Result<Self> {
        Ok(Self::new(&endpoints.embedding_url, config.embedding_timeout)?.with_retry(config.retry))
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request(&self, texts: &[&str], instruction: &str) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest { texts, instruction };
        let response: EmbeddingResponse =
            http::post_json(&self.client, SERVICE, &self.url, &body).await?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::invalid_response(
                SERVICE,
                format!(
                    "service returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    texts.len()
                ),
            ));
        }
        Ok(response.embeddings)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    texts: &'a [&'a str],
    instruction: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str, instruction: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text], instruction).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::invalid_response(SERVICE, "service returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str], instruction: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(RagError::InvalidInput("cannot embed empty text".to_string()));
        }

        debug!(service = SERVICE, batch_size = texts.len(), "embedding batch");
        self.retry.run(SERVICE, || self.request(texts, instruction)).await
    }
}
