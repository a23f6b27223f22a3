//! Fake collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use adrenaline_rag::{
    EmbeddingProvider, Entity, EntityExtractor, NoteMetadata, NoteVector, PatientId, RagError,
    Result,
};
use async_trait::async_trait;

/// Returns the same vector for every text and records the instruction.
pub struct StaticEmbedder {
    vector: Vec<f32>,
    pub calls: AtomicUsize,
    pub last_instruction: Mutex<Option<String>>,
}

impl StaticEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector, calls: AtomicUsize::new(0), last_instruction: Mutex::new(None) }
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedder {
    async fn embed(&self, _text: &str, instruction: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_instruction.lock().unwrap() = Some(instruction.to_string());
        Ok(self.vector.clone())
    }
}

/// Looks entities up by exact text. Unknown texts have no entities.
#[derive(Default)]
pub struct TableExtractor {
    table: HashMap<String, Vec<Entity>>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    pub calls: AtomicUsize,
    /// Hanging extractions that have started.
    pub hung: AtomicUsize,
    /// Hanging extractions whose future has been dropped.
    pub released: AtomicUsize,
}

/// Counts a hanging extraction as released when its future is dropped.
struct ReleaseGuard<'a>(&'a AtomicUsize);

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl TableExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `text` yields one entity per name.
    pub fn with(mut self, text: &str, names: &[&str]) -> Self {
        let entities = names
            .iter()
            .map(|name| {
                let start = text.to_lowercase().find(&name.to_lowercase()).unwrap_or(0);
                Entity::new(*name, start, start + name.len())
            })
            .collect();
        self.table.insert(text.to_string(), entities);
        self
    }

    /// Extraction of `text` fails with a service error.
    pub fn failing(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    /// Extraction of `text` never completes.
    pub fn hanging(mut self, text: &str) -> Self {
        self.hanging.insert(text.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityExtractor for TableExtractor {
    async fn extract_mentions(&self, text: &str) -> Result<Vec<Entity>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.contains(text) {
            self.hung.fetch_add(1, Ordering::SeqCst);
            let _guard = ReleaseGuard(&self.released);
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        }
        if self.failing.contains(text) {
            return Err(RagError::ServiceUnavailable {
                service: "ner".to_string(),
                message: "connection reset".to_string(),
            });
        }
        Ok(self.table.get(text).cloned().unwrap_or_default())
    }
}

/// Build a note vector.
pub fn note(patient: i64, note_id: &str, text: &str, embedding: Vec<f32>, timestamp: i64) -> NoteVector {
    NoteVector {
        patient_id: PatientId(patient),
        note_id: note_id.to_string(),
        chunk_id: None,
        embedding,
        metadata: NoteMetadata {
            note_type: "Progress note".to_string(),
            timestamp,
            encounter_id: format!("enc-{note_id}"),
            text: text.to_string(),
        },
    }
}
