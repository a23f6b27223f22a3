//! Entity-overlap ranking of vector-search candidates.
//!
//! Vector similarity alone is too permissive for building clinical context:
//! a note can sit close to the query in embedding space while sharing no
//! clinical concept with it. The [`RetrievalRanker`] keeps only candidates
//! that share at least one entity with the query and orders them by how
//! many they share.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use tracing::{debug, warn};

use crate::config::RagConfig;
use crate::entity::EntitySet;
use crate::extraction::EntityExtractor;
use crate::note::RetrievalCandidate;

/// Filters and orders candidates by entity overlap with the query.
///
/// Candidate extraction runs concurrently (up to `concurrency` requests in
/// flight) and each candidate's whole extraction, chunks and retries
/// included, is bounded by the extraction budget. A failed
/// or timed-out extraction counts as "no entities" for that candidate, which
/// excludes it without failing the retrieval.
///
/// Dropping the future returned by [`rank`](RetrievalRanker::rank) cancels
/// every extraction still in flight.
///
/// # Example
///
/// ```rust,ignore
/// use adrenaline_rag::RetrievalRanker;
///
/// let ranker = RetrievalRanker::new(Arc::new(ner_client));
/// let ranked = ranker.rank(&query_entities, candidates, 5).await;
/// ```
#[derive(Clone)]
pub struct RetrievalRanker {
    extractor: Arc<dyn EntityExtractor>,
    concurrency: usize,
    extraction_budget: Duration,
}

impl RetrievalRanker {
    /// Create a ranker with the default fan-out and extraction budget.
    pub fn new(extractor: Arc<dyn EntityExtractor>) -> Self {
        let defaults = RagConfig::default();
        Self {
            extractor,
            concurrency: defaults.extraction_concurrency,
            extraction_budget: defaults.extraction_budget,
        }
    }

    /// Create a ranker using the fan-out and extraction budget from `config`.
    pub fn from_config(extractor: Arc<dyn EntityExtractor>, config: &RagConfig) -> Self {
        Self::new(extractor)
            .with_concurrency(config.extraction_concurrency)
            .with_extraction_budget(config.extraction_budget)
    }

    /// Set how many candidate extractions run at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the bound on a single candidate's whole extraction.
    pub fn with_extraction_budget(mut self, budget: Duration) -> Self {
        self.extraction_budget = budget;
        self
    }

    /// Extract each candidate's entities, then apply [`rank_by_overlap`].
    ///
    /// With an empty query entity set nothing can overlap, so no extraction
    /// requests are made and the result is empty.
    pub async fn rank(
        &self,
        query_entities: &EntitySet,
        candidates: Vec<RetrievalCandidate>,
        top_k: usize,
    ) -> Vec<RetrievalCandidate> {
        if query_entities.is_empty() || candidates.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let extracted: Vec<(RetrievalCandidate, EntitySet)> = stream::iter(candidates)
            .map(|candidate| async move {
                let entities = self.candidate_entities(&candidate).await;
                (candidate, entities)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        rank_by_overlap(query_entities, extracted, top_k)
    }

    async fn candidate_entities(&self, candidate: &RetrievalCandidate) -> EntitySet {
        let extraction = self.extractor.extract(candidate.text());
        match tokio::time::timeout(self.extraction_budget, extraction).await {
            Ok(Ok(entities)) => entities,
            Ok(Err(e)) => {
                warn!(
                    note_id = %candidate.note_id,
                    error = %e,
                    "entity extraction failed, treating note as having no entities"
                );
                EntitySet::new()
            }
            Err(_) => {
                warn!(
                    note_id = %candidate.note_id,
                    budget_ms = self.extraction_budget.as_millis() as u64,
                    "entity extraction exceeded its budget, treating note as having no entities"
                );
                EntitySet::new()
            }
        }
    }
}

/// Keep candidates sharing at least one entity with the query, best first.
///
/// Order: overlap size descending, then similarity descending, then original
/// vector rank ascending. Identical input always yields identical output.
/// Each surviving candidate's `matching_entities` holds the shared keys.
pub fn rank_by_overlap(
    query_entities: &EntitySet,
    candidates: Vec<(RetrievalCandidate, EntitySet)>,
    top_k: usize,
) -> Vec<RetrievalCandidate> {
    let mut survivors: Vec<RetrievalCandidate> = candidates
        .into_iter()
        .filter_map(|(mut candidate, entities)| {
            let overlap = query_entities.overlap(&entities);
            if overlap.is_empty() {
                debug!(note_id = %candidate.note_id, "no shared entities, excluding note");
                return None;
            }
            candidate.matching_entities = overlap;
            Some(candidate)
        })
        .collect();

    survivors.sort_by(|a, b| {
        b.matching_entities
            .len()
            .cmp(&a.matching_entities.len())
            .then_with(|| b.similarity.total_cmp(&a.similarity))
            .then_with(|| a.vector_rank.cmp(&b.vector_rank))
    });
    survivors.truncate(top_k);
    survivors
}
