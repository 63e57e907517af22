//! TurnStore trait — the persistence collaborator for conversation state.
//!
//! The turn log is append/delete-only: turns are never edited in place.
//! That property is what lets compaction delete folded turns by identity
//! without holding a lock across the model call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::StoreError;
use crate::message::{ConversationSummary, ConversationTurn};

/// Ordering of a turn listing by creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Parameters for listing an owner's turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnQuery {
    #[serde(default)]
    pub order: SortOrder,

    /// Maximum number of turns to return (`None` = all)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Number of turns to skip, applied after ordering
    #[serde(default)]
    pub offset: usize,
}

impl TurnQuery {
    /// Every turn, oldest first.
    pub fn all() -> Self {
        Self::default()
    }

    /// The `n` most recent turns, newest first.
    pub fn newest(n: usize) -> Self {
        Self {
            order: SortOrder::NewestFirst,
            limit: Some(n),
            offset: 0,
        }
    }

    /// A page of turns, oldest first.
    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            order: SortOrder::OldestFirst,
            limit: Some(limit),
            offset,
        }
    }
}

/// The core TurnStore trait.
///
/// Implementations: in-memory (testing, ephemeral runs), SQLite.
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Append a turn to its owner's log. Returns the turn id.
    async fn append_turn(&self, turn: ConversationTurn) -> Result<String, StoreError>;

    /// List an owner's turns ordered by creation time.
    async fn list_turns(
        &self,
        owner_id: &str,
        query: TurnQuery,
    ) -> Result<Vec<ConversationTurn>, StoreError>;

    /// Total number of stored turns for an owner.
    async fn count_turns(&self, owner_id: &str) -> Result<usize, StoreError>;

    /// Delete turns by id. Unknown ids are ignored. Returns how many were removed.
    async fn delete_turns(&self, ids: &[String]) -> Result<usize, StoreError>;

    /// The most recent summary for an owner, if any.
    async fn latest_summary(&self, owner_id: &str) -> Result<Option<ConversationSummary>, StoreError>;

    /// Persist a new summary. Older summaries may be retained but are never read.
    async fn put_summary(&self, summary: ConversationSummary) -> Result<(), StoreError>;
}
