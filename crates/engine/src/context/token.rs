//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 bytes of UTF-8 per token, rounded up.
//! This approximation is within ~10% for BPE tokenizers on English text and
//! needs no model-specific vocabulary. Callers rely on it being consistent
//! and monotonic, not exact.

use canopy_core::message::Message;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for a slice of messages (content only).
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}
