//! Patient-scoped vector index abstraction.

use std::cmp::Ordering;
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::Result;
use crate::note::{NoteVector, PatientId, RetrievalCandidate, TimeRange};

/// The restriction applied to every vector search.
///
/// A scope always names a patient; there is no way to construct an
/// unscoped search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchScope {
    patient_id: PatientId,
    time_range: Option<TimeRange>,
}

impl SearchScope {
    /// Scope a search to one patient's notes.
    pub fn patient(patient_id: impl Into<PatientId>) -> Self {
        Self { patient_id: patient_id.into(), time_range: None }
    }

    /// Further restrict the search to notes written inside `range`.
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// The patient the search is restricted to.
    pub fn patient_id(&self) -> PatientId {
        self.patient_id
    }

    /// The optional time restriction.
    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }

    /// Whether a note lies inside this scope.
    pub fn contains(&self, note: &NoteVector) -> bool {
        note.patient_id == self.patient_id
            && self.time_range.is_none_or(|r| r.contains(note.metadata.timestamp))
    }
}

/// The similarity metric an index was created with.
///
/// Fixed per index. Backends report the metric's native value (a similarity
/// for inner product and cosine, a distance for L2);
/// [`to_similarity`](DistanceMetric::to_similarity) maps it so that larger is
/// always better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Dot product.
    InnerProduct,
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Euclidean distance.
    L2,
}

impl DistanceMetric {
    /// Compute the metric's native value between two vectors.
    pub fn raw(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::InnerProduct => dot(a, b),
            Self::Cosine => {
                let norm_a = dot(a, a).sqrt();
                let norm_b = dot(b, b).sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 0.0;
                }
                dot(a, b) / (norm_a * norm_b)
            }
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt(),
        }
    }

    /// Convert a native value into a similarity where larger is better.
    pub fn to_similarity(&self, raw: f32) -> f32 {
        match self {
            Self::InnerProduct | Self::Cosine => raw,
            Self::L2 => -raw,
        }
    }

    /// Similarity between two vectors.
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        self.to_similarity(self.raw(a, b))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Sort candidates best-first and record each one's position.
///
/// Ties on similarity fall back to note id, then chunk id, so the order is
/// independent of the backend's return order.
pub(crate) fn order_best_first(candidates: &mut [RetrievalCandidate]) {
    candidates.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.note_id.cmp(&b.note_id))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    for (rank, candidate) in candidates.iter_mut().enumerate() {
        candidate.vector_rank = rank;
    }
}

/// One-time readiness check shared by concurrent queries.
///
/// The first caller runs the load; concurrent callers wait for it. A failed
/// load is not remembered, so the next caller tries again.
#[derive(Debug, Default)]
pub struct LoadOnce {
    cell: OnceCell<()>,
}

impl LoadOnce {
    /// Create an unloaded marker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a load has already succeeded.
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Run `load` unless a previous call already succeeded.
    pub async fn ensure<F, Fut>(&self, load: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.cell.get_or_try_init(load).await?;
        Ok(())
    }
}

/// A vector index over patient notes that supports filtered similarity search.
///
/// Implementations must apply the [`SearchScope`] inside the index query
/// (filter, then rank), so a patient with few notes still gets all of them
/// and no other patient's note is ever scored.
///
/// # Example
///
/// ```rust,ignore
/// use adrenaline_rag::{InMemoryNoteIndex, SearchScope, VectorIndex};
///
/// let index = InMemoryNoteIndex::new(DistanceMetric::Cosine);
/// let hits = index.search(&query_vector, &SearchScope::patient(123), 20).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The metric this index was created with.
    fn metric(&self) -> DistanceMetric;

    /// Make sure the index is ready to serve queries.
    ///
    /// Idempotent and safe to call from concurrent queries; only the first
    /// call does any work.
    async fn ensure_loaded(&self) -> Result<()>;

    /// Return up to `top_k` notes inside `scope`, most similar first.
    ///
    /// An empty result is valid. Returns
    /// [`RagError::ConfigError`](crate::RagError::ConfigError) if `top_k == 0`.
    async fn search(
        &self,
        query_vector: &[f32],
        scope: &SearchScope,
        top_k: usize,
    ) -> Result<Vec<RetrievalCandidate>>;
}
