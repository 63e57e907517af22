//! Conversation memory adapter.
//!
//! Thin, typed access to the turn log and summaries for one owner at a
//! time, on top of whatever [`TurnStore`] the host wires in.

use canopy_core::error::StoreError;
use canopy_core::message::{ConversationSummary, ConversationTurn};
use canopy_core::store::{TurnQuery, TurnStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One page of an owner's conversation, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub turns: Vec<ConversationTurn>,
    pub has_more: bool,
    pub total_count: usize,
}

#[derive(Clone)]
pub struct ConversationMemory {
    store: Arc<dyn TurnStore>,
}

impl ConversationMemory {
    pub fn new(store: Arc<dyn TurnStore>) -> Self {
        Self { store }
    }

    pub fn backend_name(&self) -> &str {
        self.store.name()
    }

    pub async fn append(&self, turn: ConversationTurn) -> Result<String, StoreError> {
        self.store.append_turn(turn).await
    }

    /// The `n` most recent turns, returned oldest first.
    pub async fn recent_turns(
        &self,
        owner_id: &str,
        n: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let mut turns = self.store.list_turns(owner_id, TurnQuery::newest(n)).await?;
        turns.reverse();
        Ok(turns)
    }

    /// Every stored turn, oldest first.
    pub async fn all_turns(&self, owner_id: &str) -> Result<Vec<ConversationTurn>, StoreError> {
        self.store.list_turns(owner_id, TurnQuery::all()).await
    }

    pub async fn count(&self, owner_id: &str) -> Result<usize, StoreError> {
        self.store.count_turns(owner_id).await
    }

    pub async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        self.store.delete_turns(ids).await
    }

    pub async fn latest_summary(
        &self,
        owner_id: &str,
    ) -> Result<Option<ConversationSummary>, StoreError> {
        self.store.latest_summary(owner_id).await
    }

    /// Text of the latest summary, if any and non-blank.
    pub async fn summary_text(&self, owner_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .latest_summary(owner_id)
            .await?
            .map(|s| s.summary_text)
            .filter(|t| !t.trim().is_empty()))
    }

    pub async fn put_summary(&self, summary: ConversationSummary) -> Result<(), StoreError> {
        self.store.put_summary(summary).await
    }

    pub async fn page(
        &self,
        owner_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<HistoryPage, StoreError> {
        let total_count = self.count(owner_id).await?;
        let turns = self
            .store
            .list_turns(owner_id, TurnQuery::page(limit, offset))
            .await?;
        let has_more = offset + turns.len() < total_count;
        Ok(HistoryPage {
            turns,
            has_more,
            total_count,
        })
    }
}
