//! Provider-backed embedder.
//!
//! Adapts any [`Provider`](canopy_core::Provider) with an embeddings endpoint
//! to the [`Embedder`] trait consumed by knowledge indexes.

use async_trait::async_trait;
use canopy_core::error::KnowledgeError;
use canopy_core::provider::EmbeddingRequest;
use canopy_core::Embedder;
use std::sync::Arc;

pub struct ProviderEmbedder {
    provider: Arc<dyn canopy_core::Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn canopy_core::Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await
            .map_err(|e| KnowledgeError::EmbeddingFailed(e.to_string()))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| KnowledgeError::EmbeddingFailed("Provider returned no embedding".into()))
    }
}
