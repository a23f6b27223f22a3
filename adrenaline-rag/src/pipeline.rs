//! Retrieval pipeline orchestrator.
//!
//! The [`RetrievalPipeline`] runs one retrieval in strict stage order:
//! embed the query → patient-scoped vector search → extract entities from
//! the query and every candidate → rank by entity overlap. No stage starts
//! before the previous one has finished.
//!
//! # Example
//!
//! ```rust,ignore
//! use adrenaline_rag::{RetrievalPipeline, RagConfig, SearchScope};
//!
//! let pipeline = RetrievalPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(embedding_client))
//!     .vector_index(Arc::new(note_index))
//!     .entity_extractor(Arc::new(ner_client))
//!     .build()?;
//!
//! let result = pipeline.retrieve_context("chest pain medication", SearchScope::patient(123), 5).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::entity::EntitySet;
use crate::error::{RagError, Result};
use crate::extraction::EntityExtractor;
use crate::note::{RetrievalResult, TimeRange};
use crate::ranker::RetrievalRanker;
use crate::vector_index::{SearchScope, VectorIndex};

/// A retrieval request as received from a route handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalRequest {
    /// The user's question.
    pub query: String,
    /// Patient whose notes are searched. Required.
    #[serde(default)]
    pub patient_id: Option<i64>,
    /// Overrides the configured `top_k`.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Restricts the search to notes written inside this range.
    #[serde(default)]
    pub time_range: Option<TimeRange>,
}

impl RetrievalRequest {
    /// Build the search scope.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `patient_id` is missing or the
    /// time range is inverted.
    pub fn scope(&self) -> Result<SearchScope> {
        let patient_id = self.patient_id.ok_or_else(|| {
            RagError::ConfigError("patient_id is required for note retrieval".to_string())
        })?;
        let scope = SearchScope::patient(patient_id);
        match self.time_range {
            Some(range) => Ok(scope.with_time_range(TimeRange::new(range.start, range.end)?)),
            None => Ok(scope),
        }
    }
}

/// The retrieval pipeline orchestrator.
///
/// Collaborators are injected as trait objects and shared across requests;
/// the pipeline itself holds no per-request state, so one instance can serve
/// concurrent requests. Construct one via [`RetrievalPipeline::builder()`].
pub struct RetrievalPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<dyn VectorIndex>,
    entity_extractor: Arc<dyn EntityExtractor>,
    ranker: RetrievalRanker,
}

impl RetrievalPipeline {
    /// Create a new [`RetrievalPipelineBuilder`].
    pub fn builder() -> RetrievalPipelineBuilder {
        RetrievalPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the vector index.
    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.vector_index
    }

    /// Run a request from a route handler, using the configured `top_k`
    /// unless the request overrides it.
    ///
    /// # Errors
    ///
    /// See [`retrieve_context`](RetrievalPipeline::retrieve_context); also
    /// returns [`RagError::ConfigError`] when the request has no patient id.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult> {
        let scope = request.scope()?;
        let top_k = request.top_k.unwrap_or(self.config.top_k);
        self.retrieve_context(&request.query, scope, top_k).await
    }

    /// Retrieve up to `top_k` notes from `scope` relevant to `query`.
    ///
    /// An empty result means no relevant context was found; callers answer
    /// in general (non-patient) mode.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] for an empty query
    /// - [`RagError::ConfigError`] for `top_k == 0` or a missing collection
    /// - [`RagError::ServiceUnavailable`] when the embedding service, the
    ///   vector index, or query-entity extraction still fails after retry
    ///
    /// Failures extracting a single candidate's entities are not errors. When
    /// the query itself has no entities the result is empty.
    ///
    /// Dropping the returned future cancels every extraction still in flight.
    #[instrument(skip_all, fields(patient_id = %scope.patient_id(), top_k = top_k))]
    pub async fn retrieve_context(
        &self,
        query: &str,
        scope: SearchScope,
        top_k: usize,
    ) -> Result<RetrievalResult> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("query must not be empty".to_string()));
        }
        if top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }

        // 1. Embed the query
        let query_vector = self
            .embedding_provider
            .embed(query, &self.config.embedding_instruction)
            .await
            .map_err(|e| {
                error!(error = %e, "query embedding failed");
                e
            })?;

        // 2. Patient-scoped vector search
        let pool = self.config.candidate_pool.max(top_k);
        let mut candidates = self
            .config
            .retry
            .run("vector_index", || self.vector_index.search(&query_vector, &scope, pool))
            .await
            .map_err(|e| {
                error!(error = %e, "vector search failed");
                e
            })?;

        let before = candidates.len();
        candidates.retain(|c| c.patient_id == scope.patient_id());
        if candidates.len() != before {
            error!(dropped = before - candidates.len(), "vector index returned out-of-scope notes");
        }

        if candidates.is_empty() {
            info!("no notes matched the search scope");
            return Ok(RetrievalResult::empty(EntitySet::new()));
        }

        // 3. Query entities. An empty set shares nothing with any note, so
        // the ranker returns nothing and the caller answers in general mode.
        let query_entities = self.query_entities(query).await?;

        // 4. Candidate entities + overlap ranking
        let candidate_count = candidates.len();
        let ranked = self.ranker.rank(&query_entities, candidates, top_k).await;

        if ranked.is_empty() {
            info!(
                candidate_count,
                query_entity_count = query_entities.len(),
                "no candidate shares an entity with the query, falling back to general mode"
            );
        } else {
            info!(candidate_count, result_count = ranked.len(), "retrieval completed");
        }

        Ok(RetrievalResult { candidates: ranked, query_entities })
    }

    /// Extract the query's entities within the extraction budget.
    ///
    /// An empty set is not an error: it yields an empty result, which
    /// [`RetrievalResult::mode`] maps to general (non-patient) answering.
    async fn query_entities(&self, query: &str) -> Result<EntitySet> {
        let budget = self.config.extraction_budget;
        match tokio::time::timeout(budget, self.entity_extractor.extract(query)).await {
            Ok(result) => result.map_err(|e| {
                error!(error = %e, "query entity extraction failed");
                e
            }),
            Err(_) => {
                error!(
                    budget_ms = budget.as_millis() as u64,
                    "query entity extraction exceeded its budget"
                );
                Err(RagError::unavailable("ner", "query entity extraction exceeded its budget"))
            }
        }
    }
}

/// Builder for constructing a [`RetrievalPipeline`].
///
/// All fields except `config` are required; `config` defaults to
/// [`RagConfig::default()`]. Call [`build()`](RetrievalPipelineBuilder::build)
/// to validate and produce the pipeline.
#[derive(Default)]
pub struct RetrievalPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    entity_extractor: Option<Arc<dyn EntityExtractor>>,
}

impl RetrievalPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector index.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Set the entity extractor.
    pub fn entity_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.entity_extractor = Some(extractor);
        self
    }

    /// Build the [`RetrievalPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing.
    pub fn build(self) -> Result<RetrievalPipeline> {
        let config = self.config.unwrap_or_default();
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_index = self
            .vector_index
            .ok_or_else(|| RagError::ConfigError("vector_index is required".to_string()))?;
        let entity_extractor = self
            .entity_extractor
            .ok_or_else(|| RagError::ConfigError("entity_extractor is required".to_string()))?;

        let ranker = RetrievalRanker::from_config(entity_extractor.clone(), &config);

        Ok(RetrievalPipeline { config, embedding_provider, vector_index, entity_extractor, ranker })
    }
}
