//! # adrenaline-rag
//!
//! Patient-scoped retrieval for clinical question answering.
//!
//! A query is embedded, searched against one patient's indexed notes, and the
//! candidates are filtered to those sharing at least one clinical entity with
//! the query, ordered by how many they share. The result feeds an LLM
//! context builder; an empty result means "answer without patient context".
//!
//! ## Components
//!
//! - [`EmbeddingProvider`] / [`HttpEmbeddingClient`]: text → vector
//! - [`VectorIndex`] / [`InMemoryNoteIndex`] / `qdrant::QdrantNoteIndex`:
//!   patient-scoped similarity search
//! - [`EntityExtractor`] / [`NerClient`]: text → clinical entities, chunk-aware
//! - [`RetrievalRanker`]: entity-overlap filter and ordering
//! - [`RetrievalPipeline`]: orchestration and the `retrieve_context` entry point
//! - [`ContextBuilder`]: prompt context with the general-mode fallback
//! - [`AnswerPrompt`] / [`parse_answer`]: answer prompt and reply parsing
//!
//! ## Feature flags
//!
//! - `qdrant`: [Qdrant](https://qdrant.tech/) note index

pub mod chunking;
pub mod config;
pub mod context;
pub mod embedding;
pub mod embedding_service;
pub mod entity;
pub mod error;
pub mod extraction;
mod http;
pub mod inmemory;
pub mod note;
pub mod pipeline;
pub mod prompt;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod ranker;
pub mod retry;
pub mod telemetry;
pub mod vector_index;

pub use chunking::{TextChunk, split_for_extraction};
pub use config::{RagConfig, RagConfigBuilder, ServiceEndpoints};
pub use context::{AnswerContext, AnswerMode, ContextBuilder};
pub use embedding::EmbeddingProvider;
pub use embedding_service::HttpEmbeddingClient;
pub use entity::{Entity, EntityKey, EntitySet};
pub use error::{RagError, Result};
pub use extraction::{EntityExtractor, NerClient};
pub use inmemory::InMemoryNoteIndex;
pub use note::{
    NoteMetadata, NoteVector, PatientId, RetrievalCandidate, RetrievalResult, TimeRange,
};
pub use pipeline::{RetrievalPipeline, RetrievalPipelineBuilder, RetrievalRequest};
pub use prompt::{AnswerPrompt, LlmAnswer, parse_answer};
pub use ranker::{RetrievalRanker, rank_by_overlap};
pub use retry::RetryPolicy;
pub use vector_index::{DistanceMetric, LoadOnce, SearchScope, VectorIndex};
