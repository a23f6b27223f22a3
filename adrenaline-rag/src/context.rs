//! LLM context assembly from retrieval output.
//!
//! When retrieval finds nothing relevant the builder switches to
//! [`AnswerMode::General`]: the model answers without patient context
//! instead of being fed unrelated notes.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::note::{RetrievalCandidate, RetrievalResult};

/// Placeholder context used when no relevant note was found.
pub const NO_CONTEXT: &str = "No relevant patient notes found.";

const NOTE_SEPARATOR: &str = "\n---\n";

/// How the downstream model should answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Answer from the supplied patient notes.
    Patient,
    /// No relevant notes; answer as a general clinical question.
    General,
}

/// Context text plus the mode it was built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerContext {
    /// Answering mode.
    pub mode: AnswerMode,
    /// Prompt-ready context text.
    pub text: String,
}

/// Formats retrieved notes into prompt context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBuilder {
    max_note_chars: Option<usize>,
}

impl ContextBuilder {
    /// Create a builder that includes full note text.
    pub fn new() -> Self {
        Self::default()
    }

    /// Truncate each note's content to `chars` characters.
    pub fn with_max_note_chars(mut self, chars: usize) -> Self {
        self.max_note_chars = Some(chars);
        self
    }

    /// Build the context for a retrieval result.
    pub fn build(&self, result: &RetrievalResult) -> AnswerContext {
        if result.is_empty() {
            return AnswerContext { mode: AnswerMode::General, text: NO_CONTEXT.to_string() };
        }
        let text = result
            .candidates
            .iter()
            .map(|c| self.format_note(c))
            .collect::<Vec<_>>()
            .join(NOTE_SEPARATOR);
        AnswerContext { mode: AnswerMode::Patient, text }
    }

    fn format_note(&self, candidate: &RetrievalCandidate) -> String {
        let date = DateTime::from_timestamp(candidate.metadata.timestamp, 0)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let content = match self.max_note_chars {
            Some(limit) => truncate_chars(candidate.text(), limit),
            None => candidate.text(),
        };
        let mut note = format!(
            "Note Type: {}\nDate: {date}\nContent: {content}\nRelevance Score: {:.3}\n",
            candidate.metadata.note_type, candidate.similarity
        );
        if !candidate.matching_entities.is_empty() {
            let shared: Vec<&str> =
                candidate.matching_entities.iter().map(|k| k.as_str()).collect();
            note.push_str(&format!("Matching Entities: {}\n", shared.join(", ")));
        }
        note
    }
}

impl RetrievalResult {
    /// The answering mode this result calls for.
    pub fn mode(&self) -> AnswerMode {
        if self.is_empty() { AnswerMode::General } else { AnswerMode::Patient }
    }
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}
