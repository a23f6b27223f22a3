//! Data types for indexed patient notes and retrieval output.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityKey, EntitySet};
use crate::error::{RagError, Result};

/// Identifier of a patient. Every vector search is scoped by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub i64);

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for PatientId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// An inclusive range of unix timestamps (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Earliest timestamp included.
    pub start: i64,
    /// Latest timestamp included.
    pub end: i64,
}

impl TimeRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(RagError::ConfigError(format!(
                "time range start ({start}) is after end ({end})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Whether `timestamp` falls inside the range.
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

/// Metadata denormalized onto every indexed note vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteMetadata {
    /// Note category, e.g. `Discharge summary`.
    pub note_type: String,
    /// Unix timestamp (seconds) the note was written.
    pub timestamp: i64,
    /// Encounter the note belongs to.
    pub encounter_id: String,
    /// Raw note text, or the chunk text for chunked notes.
    pub text: String,
}

/// A note (or note chunk) and its embedding, as written by the ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteVector {
    /// Owning patient.
    pub patient_id: PatientId,
    /// Note identifier.
    pub note_id: String,
    /// Chunk position when the note was split before embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<u32>,
    /// The embedding vector.
    pub embedding: Vec<f32>,
    /// Denormalized note metadata.
    pub metadata: NoteMetadata,
}

/// A note returned by vector search, carried through entity ranking.
///
/// Lives only for the duration of one retrieval call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalCandidate {
    /// Owning patient.
    pub patient_id: PatientId,
    /// Note identifier.
    pub note_id: String,
    /// Chunk position for chunked notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<u32>,
    /// Note metadata and text.
    pub metadata: NoteMetadata,
    /// Similarity to the query; higher is more similar for every metric.
    pub similarity: f32,
    /// Position in the vector-search output (0 = most similar).
    pub vector_rank: usize,
    /// Entities shared with the query, filled in by the ranker.
    #[serde(default)]
    pub matching_entities: Vec<EntityKey>,
}

impl RetrievalCandidate {
    /// Build a candidate from an indexed note, dropping its embedding.
    pub fn from_note(note: &NoteVector, similarity: f32) -> Self {
        Self {
            patient_id: note.patient_id,
            note_id: note.note_id.clone(),
            chunk_id: note.chunk_id,
            metadata: note.metadata.clone(),
            similarity,
            vector_rank: 0,
            matching_entities: Vec::new(),
        }
    }

    /// The note text the candidate carries.
    pub fn text(&self) -> &str {
        &self.metadata.text
    }
}

/// Output of one retrieval call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// Ranked notes, at most `top_k`.
    pub candidates: Vec<RetrievalCandidate>,
    /// Entities extracted from the query.
    pub query_entities: EntitySet,
}

impl RetrievalResult {
    /// A result with no relevant notes.
    pub fn empty(query_entities: EntitySet) -> Self {
        Self { candidates: Vec::new(), query_entities }
    }

    /// Whether no relevant note was found.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Number of ranked notes.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}
