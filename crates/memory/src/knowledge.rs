//! In-memory knowledge index.
//!
//! Holds grow-guide documents with their embeddings and answers
//! [`KnowledgeSearch`] queries by cosine similarity. Documents can be seeded
//! from a JSON file; entries without a precomputed embedding are embedded
//! on load with the injected [`Embedder`].

use crate::vector;
use async_trait::async_trait;
use canopy_core::error::KnowledgeError;
use canopy_core::knowledge::{Embedder, KnowledgePassage, KnowledgeSearch};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// A stored document and its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Shape of one entry in a seed file.
#[derive(Debug, Deserialize)]
struct SeedDocument {
    #[serde(default)]
    id: Option<String>,
    title: String,
    content: String,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

pub struct InMemoryKnowledgeIndex {
    embedder: Arc<dyn Embedder>,
    documents: RwLock<Vec<KnowledgeDocument>>,
}

impl InMemoryKnowledgeIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Embed and index a document. Returns its id.
    pub async fn add_document(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<String, KnowledgeError> {
        let content = content.into();
        let embedding = self.embedder.embed(&content).await?;
        let id = Uuid::new_v4().to_string();
        self.documents.write().await.push(KnowledgeDocument {
            id: id.clone(),
            title: title.into(),
            content,
            embedding,
        });
        Ok(id)
    }

    /// Index a document whose embedding is already known.
    pub async fn insert(&self, document: KnowledgeDocument) {
        self.documents.write().await.push(document);
    }

    /// Load a JSON array of `{id?, title, content, embedding?}` entries.
    pub async fn load_json(&self, path: &Path) -> Result<usize, KnowledgeError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            KnowledgeError::SearchFailed(format!("Failed to read {}: {e}", path.display()))
        })?;
        let seeds: Vec<SeedDocument> = serde_json::from_str(&raw).map_err(|e| {
            KnowledgeError::SearchFailed(format!("Failed to parse {}: {e}", path.display()))
        })?;

        let count = seeds.len();
        for seed in seeds {
            let embedding = match seed.embedding {
                Some(e) => e,
                None => self.embedder.embed(&seed.content).await?,
            };
            self.insert(KnowledgeDocument {
                id: seed.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                title: seed.title,
                content: seed.content,
                embedding,
            })
            .await;
        }

        info!(path = %path.display(), count, "Knowledge documents loaded");
        Ok(count)
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl KnowledgeSearch for InMemoryKnowledgeIndex {
    async fn search(
        &self,
        query: &str,
        threshold: f32,
        max_results: usize,
    ) -> Result<Vec<KnowledgePassage>, KnowledgeError> {
        let documents = self.documents.read().await;
        if documents.is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let results = vector::vector_search(&documents, &query_embedding, max_results, threshold);
        debug!(
            model = %self.embedder.model(),
            candidates = documents.len(),
            matched = results.len(),
            "Knowledge search complete"
        );
        Ok(results)
    }
}
