//! In-memory patient note index.
//!
//! This module provides [`InMemoryNoteIndex`], a dependency-free
//! [`VectorIndex`] backed by a `HashMap` of per-patient partitions protected
//! by a `tokio::sync::RwLock`. It is suitable for development, tests, and
//! small deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{RagError, Result};
use crate::note::{NoteVector, PatientId, RetrievalCandidate};
use crate::vector_index::{DistanceMetric, SearchScope, VectorIndex, order_best_first};

/// An in-memory [`VectorIndex`] partitioned by patient.
///
/// Notes are stored as patient id → notes, so a search only ever reads the
/// requested patient's partition.
///
/// # Example
///
/// ```rust,ignore
/// use adrenaline_rag::{DistanceMetric, InMemoryNoteIndex};
///
/// let index = InMemoryNoteIndex::new(DistanceMetric::Cosine);
/// index.insert(note).await;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryNoteIndex {
    metric: DistanceMetric,
    partitions: RwLock<HashMap<PatientId, Vec<NoteVector>>>,
}

impl InMemoryNoteIndex {
    /// Create a new empty index using `metric`.
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric, partitions: RwLock::default() }
    }

    /// Add a note, replacing any existing note with the same note and chunk id.
    pub async fn insert(&self, note: NoteVector) {
        let mut partitions = self.partitions.write().await;
        let notes = partitions.entry(note.patient_id).or_default();
        match notes.iter_mut().find(|n| n.note_id == note.note_id && n.chunk_id == note.chunk_id) {
            Some(existing) => *existing = note,
            None => notes.push(note),
        }
    }

    /// Add many notes.
    pub async fn insert_all(&self, notes: impl IntoIterator<Item = NoteVector>) {
        for note in notes {
            self.insert(note).await;
        }
    }

    /// Number of notes stored for a patient.
    pub async fn note_count(&self, patient_id: PatientId) -> usize {
        self.partitions.read().await.get(&patient_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl VectorIndex for InMemoryNoteIndex {
    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn ensure_loaded(&self) -> Result<()> {
        Ok(())
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

        let partitions = self.partitions.read().await;
        let Some(notes) = partitions.get(&scope.patient_id()) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<RetrievalCandidate> = notes
            .iter()
            .filter(|note| scope.contains(note))
            .map(|note| {
                let similarity = self.metric.similarity(&note.embedding, query_vector);
                RetrievalCandidate::from_note(note, similarity)
            })
            .collect();

        order_best_first(&mut scored);
        scored.truncate(top_k);
        Ok(scored)
    }
}
