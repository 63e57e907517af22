//! Knowledge retrieval adapter.
//!
//! Asks the semantic search collaborator for the top-K passages above a
//! similarity threshold, then concatenates titled passages, best first,
//! until the block's token allowance would be exceeded. Passages are taken
//! whole or not at all.

use crate::context::token;
use canopy_config::KnowledgeConfig;
use canopy_core::error::KnowledgeError;
use canopy_core::knowledge::{KnowledgePassage, KnowledgeSearch};
use std::sync::Arc;

/// Retrieval parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub threshold: f32,
    pub max_results: usize,
    pub max_tokens: usize,
}

impl From<&KnowledgeConfig> for RetrievalSettings {
    fn from(config: &KnowledgeConfig) -> Self {
        Self {
            threshold: config.match_threshold,
            max_results: config.match_count,
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self::from(&KnowledgeConfig::default())
    }
}

/// A rendered knowledge block.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBlock {
    pub text: String,
    pub included: usize,
    pub retrieved: usize,
}

impl KnowledgeBlock {
    pub fn is_empty(&self) -> bool {
        self.included == 0
    }
}

pub struct KnowledgeRetriever {
    search: Arc<dyn KnowledgeSearch>,
    settings: RetrievalSettings,
}

impl KnowledgeRetriever {
    pub fn new(search: Arc<dyn KnowledgeSearch>, settings: RetrievalSettings) -> Self {
        Self { search, settings }
    }

    pub async fn retrieve(&self, query: &str) -> Result<KnowledgeBlock, KnowledgeError> {
        let passages = self
            .search
            .search(query, self.settings.threshold, self.settings.max_results)
            .await?;
        Ok(build_block(passages, self.settings.max_tokens))
    }
}

/// Sort passages by similarity and pack whole passages under `max_tokens`.
pub fn build_block(mut passages: Vec<KnowledgePassage>, max_tokens: usize) -> KnowledgeBlock {
    let retrieved = passages.len();
    passages.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut parts = Vec::new();
    let mut used = 0;
    for passage in &passages {
        let entry = format!("### {}\n{}\n", passage.title, passage.content);
        let cost = token::estimate_tokens(&entry);
        if used + cost > max_tokens {
            break;
        }
        used += cost;
        parts.push(entry);
    }

    KnowledgeBlock {
        included: parts.len(),
        text: parts.join("\n"),
        retrieved,
    }
}
