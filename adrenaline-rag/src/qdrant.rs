//! Qdrant note index backend.
//!
//! Provides [`QdrantNoteIndex`] which implements [`VectorIndex`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//! The patient (and optional timestamp) restriction is sent as a Qdrant
//! payload filter, so scoping happens inside the index before ranking.
//!
//! Expected point payload: `patient_id` (integer), `note_id`, `note_type`,
//! `encounter_id`, `text` (strings), `timestamp` (integer) and an optional
//! integer `chunk_id`.
//!
//! # Example
//!
//! ```rust,ignore
//! use adrenaline_rag::qdrant::QdrantNoteIndex;
//!
//! let index = QdrantNoteIndex::new("http://localhost:6334", "patient_notes", DistanceMetric::Cosine)?;
//! let hits = index.search(&query_vector, &SearchScope::patient(123), 20).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, Filter, Range, ScoredPoint, SearchPointsBuilder, Value as QdrantValue,
};
use qdrant_client::Qdrant;
use tracing::{debug, error};

use crate::config::ServiceEndpoints;
use crate::error::{RagError, Result};
use crate::note::{NoteMetadata, PatientId, RetrievalCandidate};
use crate::vector_index::{
    DistanceMetric, LoadOnce, SearchScope, VectorIndex, order_best_first,
};

const SERVICE: &str = "qdrant";

/// A [`VectorIndex`] backed by a [Qdrant](https://qdrant.tech/) collection.
///
/// The client connection is created once and shared by every query. The
/// collection check runs lazily on first use.
pub struct QdrantNoteIndex {
    client: Qdrant,
    collection: String,
    metric: DistanceMetric,
    loaded: LoadOnce,
}

impl QdrantNoteIndex {
    /// Connect to Qdrant at `url` and serve `collection`, which must have been
    /// created with `metric`.
    pub fn new(url: &str, collection: impl Into<String>, metric: DistanceMetric) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(|e| {
            RagError::ConfigError(format!("failed to build qdrant client for '{url}': {e}"))
        })?;
        Ok(Self::from_client(client, collection, metric))
    }

    /// Connect using configured endpoints.
    pub fn from_endpoints(endpoints: &ServiceEndpoints, metric: DistanceMetric) -> Result<Self> {
        Self::new(&endpoints.vector_index_url, endpoints.collection.clone(), metric)
    }

    /// Wrap an existing client.
    pub fn from_client(client: Qdrant, collection: impl Into<String>, metric: DistanceMetric) -> Self {
        Self { client, collection: collection.into(), metric, loaded: LoadOnce::new() }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::unavailable(SERVICE, e.to_string())
    }

    fn scope_filter(scope: &SearchScope) -> Filter {
        let mut conditions = vec![Condition::matches("patient_id", scope.patient_id().0)];
        if let Some(range) = scope.time_range() {
            conditions.push(Condition::range(
                "timestamp",
                Range {
                    gte: Some(range.start as f64),
                    lte: Some(range.end as f64),
                    ..Default::default()
                },
            ));
        }
        Filter::must(conditions)
    }

    fn string_field(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
        match payload.get(key).and_then(|v| v.kind.as_ref()) {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            Some(Kind::IntegerValue(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn integer_field(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<i64> {
        match payload.get(key).and_then(|v| v.kind.as_ref()) {
            Some(Kind::IntegerValue(n)) => Some(*n),
            Some(Kind::DoubleValue(d)) => Some(*d as i64),
            Some(Kind::StringValue(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// Decode one hit. Returns `None` for hits outside the requested patient.
    fn decode(&self, point: ScoredPoint, scope: &SearchScope) -> Option<RetrievalCandidate> {
        let payload = &point.payload;
        let patient_id = PatientId(Self::integer_field(payload, "patient_id")?);
        if patient_id != scope.patient_id() {
            error!(
                requested = %scope.patient_id(),
                returned = %patient_id,
                "qdrant returned a point outside the search scope, dropping it"
            );
            return None;
        }

        let metadata = NoteMetadata {
            note_type: Self::string_field(payload, "note_type").unwrap_or_default(),
            timestamp: Self::integer_field(payload, "timestamp").unwrap_or_default(),
            encounter_id: Self::string_field(payload, "encounter_id").unwrap_or_default(),
            text: Self::string_field(payload, "text")
                .or_else(|| Self::string_field(payload, "note_text"))
                .unwrap_or_default(),
        };

        Some(RetrievalCandidate {
            patient_id,
            note_id: Self::string_field(payload, "note_id").unwrap_or_default(),
            chunk_id: Self::integer_field(payload, "chunk_id").and_then(|c| u32::try_from(c).ok()),
            metadata,
            similarity: self.metric.to_similarity(point.score),
            vector_rank: 0,
            matching_entities: Vec::new(),
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantNoteIndex {
    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn ensure_loaded(&self) -> Result<()> {
        self.loaded
            .ensure(|| async {
                let collections = self.client.list_collections().await.map_err(Self::map_err)?;
                if !collections.collections.iter().any(|c| c.name == self.collection) {
                    return Err(RagError::ConfigError(format!(
                        "collection '{}' does not exist in qdrant",
                        self.collection
                    )));
                }
                debug!(collection = %self.collection, "qdrant collection ready");
                Ok(())
            })
            .await
    }

    async fn search(
        &self,
        query_vector: &[f32],
        scope: &SearchScope,
        top_k: usize,
    ) -> Result<Vec<RetrievalCandidate>> {
        if top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        self.ensure_loaded().await?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query_vector.to_vec(), top_k as u64)
                    .filter(Self::scope_filter(scope))
                    .with_payload(true),
            )
            .await
            .map_err(Self::map_err)?;

        let mut candidates: Vec<RetrievalCandidate> =
            response.result.into_iter().filter_map(|point| self.decode(point, scope)).collect();
        order_best_first(&mut candidates);

        debug!(
            collection = %self.collection,
            patient_id = %scope.patient_id(),
            count = candidates.len(),
            "qdrant search completed"
        );
        Ok(candidates)
    }
}
