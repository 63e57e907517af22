//! Vector similarity utilities.
//!
//! Pure-Rust cosine similarity and threshold-filtered ranking over embedded
//! knowledge documents.

use crate::knowledge::KnowledgeDocument;
use canopy_core::knowledge::KnowledgePassage;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank documents by cosine similarity to a query embedding.
///
/// Returns passages sorted by descending similarity. Only documents that
/// meet `threshold` are included, at most `limit` of them.
pub fn vector_search(
    documents: &[KnowledgeDocument],
    query_embedding: &[f32],
    limit: usize,
    threshold: f32,
) -> Vec<KnowledgePassage> {
    let mut scored: Vec<KnowledgePassage> = documents
        .iter()
        .filter_map(|doc| {
            let similarity = cosine_similarity(&doc.embedding, query_embedding);
            (similarity >= threshold).then(|| KnowledgePassage {
                id: doc.id.clone(),
                title: doc.title.clone(),
                content: doc.content.clone(),
                similarity,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}
