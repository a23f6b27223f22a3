//! Named-entity extraction from clinical text.
//!
//! [`EntityExtractor`] is the seam the ranker depends on. [`NerClient`] is the
//! HTTP implementation talking to the clinical NER service
//! (`POST /extract_entities`, `{text}` → `{entities: [...]}`). Texts longer
//! than the service limit are split with
//! [`split_for_extraction`](crate::chunking::split_for_extraction) and every
//! entity span is shifted back into the original text's offset space.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunking::split_for_extraction;
use crate::config::{RagConfig, ServiceEndpoints};
use crate::entity::{Entity, EntitySet};
use crate::error::{RagError, Result};
use crate::http;
use crate::retry::RetryPolicy;

const SERVICE: &str = "ner";

/// Default number of characters sent to the service per request.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 512;

/// Default number of chunk requests one text keeps in flight.
pub const DEFAULT_CHUNK_CONCURRENCY: usize = 4;

/// Extracts clinical entities from free text.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Every mention found in `text`, with spans in `text`'s character offsets.
    async fn extract_mentions(&self, text: &str) -> Result<Vec<Entity>>;

    /// The distinct entities of `text`.
    async fn extract(&self, text: &str) -> Result<EntitySet> {
        Ok(self.extract_mentions(text).await?.into())
    }
}

/// An [`EntityExtractor`] backed by the clinical NER microservice.
///
/// Accepts both response shapes the service family produces: concept-linked
/// entities (`pretty_name`, `cui`, `types`) and token-classification groups
/// (`word`, `entity_group`). Each request is bounded by the client timeout;
/// the chunks of a long text are sent concurrently and their entities are
/// returned in text order.
#[derive(Debug, Clone)]
pub struct NerClient {
    client: reqwest::Client,
    url: String,
    max_chunk_chars: usize,
    chunk_concurrency: usize,
    retry: RetryPolicy,
}

impl NerClient {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::build_client(SERVICE, timeout)?,
            url: http::endpoint_url(SERVICE, base_url, "extract_entities")?,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            chunk_concurrency: DEFAULT_CHUNK_CONCURRENCY,
            retry: RetryPolicy::default(),
        })
    }

    /// Create a client from endpoint and pipeline configuration.
    pub fn from_config(endpoints: &ServiceEndpoints, config: &RagConfig) -> Result<Self> {
        Ok(Self::new(&endpoints.ner_url, config.extraction_timeout)?
            .with_max_chunk_chars(config.max_chunk_chars)
            .with_retry(config.retry))
    }

    /// Set the per-request character limit.
    pub fn with_max_chunk_chars(mut self, chars: usize) -> Self {
        self.max_chunk_chars = chars;
        self
    }

    /// Set how many chunk requests of one text run at once.
    pub fn with_chunk_concurrency(mut self, n: usize) -> Self {
        self.chunk_concurrency = n.max(1);
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request(&self, text: &str) -> Result<Vec<Entity>> {
        let response: NerResponse =
            http::post_json(&self.client, SERVICE, &self.url, &NerRequest { text }).await?;
        Ok(response.entities.into_iter().map(WireEntity::into_entity).collect())
    }
}

#[derive(Serialize)]
struct NerRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct NerResponse {
    #[serde(default)]
    entities: Vec<WireEntity>,
}

#[derive(Deserialize)]
struct WireEntity {
    #[serde(alias = "word")]
    pretty_name: String,
    #[serde(default)]
    cui: Option<String>,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    entity_group: Option<String>,
    start: usize,
    end: usize,
}

impl WireEntity {
    fn into_entity(self) -> Entity {
        let mut types = self.types;
        if types.is_empty() {
            types.extend(self.entity_group);
        }
        Entity {
            pretty_name: self.pretty_name,
            cui: self.cui.filter(|c| !c.trim().is_empty()),
            types,
            start: self.start,
            end: self.end,
        }
    }
}

#[async_trait]
impl EntityExtractor for NerClient {
    async fn extract_mentions(&self, text: &str) -> Result<Vec<Entity>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let chunks = split_for_extraction(text, self.max_chunk_chars);
        debug!(
            service = SERVICE,
            chars = text.chars().count(),
            chunks = chunks.len(),
            "extracting entities"
        );

        let per_chunk: Vec<Vec<Entity>> = stream::iter(chunks)
            .map(|chunk| async move {
                let found = self.retry.run(SERVICE, || self.request(chunk.text)).await?;
                Ok::<_, RagError>(
                    found.into_iter().map(|e| e.shifted(chunk.char_offset)).collect::<Vec<_>>(),
                )
            })
            .buffered(self.chunk_concurrency)
            .boxed()
            .try_collect()
            .await?;
        Ok(per_chunk.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_concept_linked_entities() {
        let body = r#"{"text":"x","entities":[{"pretty_name":"Chest Pain","cui":"C0008031",
            "types":["Sign or Symptom"],"detected_name":"chest~pain","acc":0.9,"start":3,"end":13}]}"#;
        let response: NerResponse = serde_json::from_str(body).unwrap();
        let entity = response.entities.into_iter().next().unwrap().into_entity();
        assert_eq!(entity.pretty_name, "Chest Pain");
        assert_eq!(entity.cui.as_deref(), Some("C0008031"));
        assert_eq!((entity.start, entity.end), (3, 13));
    }

    #[test]
    fn decodes_token_classification_groups() {
        let body = r#"{"entities":[{"entity_group":"MEDICATION","word":"aspirin","start":0,"end":7,"score":0.98}]}"#;
        let response: NerResponse = serde_json::from_str(body).unwrap();
        let entity = response.entities.into_iter().next().unwrap().into_entity();
        assert_eq!(entity.pretty_name, "aspirin");
        assert_eq!(entity.types, ["MEDICATION"]);
        assert!(entity.cui.is_none());
    }
}
