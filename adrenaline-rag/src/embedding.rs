//! Embedding provider trait for turning text into dense vectors.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// The `instruction` is a task-framing prefix (e.g. `"Represent the query for
/// retrieval:"`) that instruction-tuned embedding models expect; providers pass
/// it through unchanged. The returned dimensionality must match the vector
/// index; a mismatch is a deployment error and is not checked per call.
///
/// # Example
///
/// ```rust,ignore
/// use adrenaline_rag::EmbeddingProvider;
///
/// let vector = provider.embed("chest pain medication", "Represent the query for retrieval:").await?;
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single non-empty text.
    async fn embed(&self, text: &str, instruction: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of texts.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Override this method if the backend
    /// supports native batch embedding.
    async fn embed_batch(&self, texts: &[&str], instruction: &str) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text, instruction).await?);
        }
        Ok(results)
    }
}
