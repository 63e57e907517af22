//! Semantic knowledge retrieval.
//!
//! [`KnowledgeSearch`] is the retrieval collaborator the engine consumes:
//! given a query string it returns passages scored by similarity.
//! [`Embedder`] turns text into vectors; it is constructed once at start-up
//! and injected into whichever index needs it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::KnowledgeError;

/// A passage returned by semantic search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgePassage {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Cosine similarity to the query (0.0–1.0).
    pub similarity: f32,
}

/// Semantic search over the knowledge base.
#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    /// Return up to `max_results` passages with similarity ≥ `threshold`.
    async fn search(
        &self,
        query: &str,
        threshold: f32,
        max_results: usize,
    ) -> Result<Vec<KnowledgePassage>, KnowledgeError>;
}

/// Text → embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embedding model identifier.
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError>;
}
