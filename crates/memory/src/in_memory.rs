//! In-memory store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use canopy_core::error::{NotifyError, StoreError};
use canopy_core::message::{ConversationSummary, ConversationTurn};
use canopy_core::notify::{Notification, NotificationSink};
use canopy_core::store::{SortOrder, TurnQuery, TurnStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An in-memory store that keeps turns, summaries and notifications in Vecs.
///
/// Turns with equal timestamps keep their insertion order.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    turns: Arc<RwLock<Vec<ConversationTurn>>>,
    summaries: Arc<RwLock<Vec<ConversationSummary>>>,
    notifications: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notification delivered so far, oldest first.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().await.clone()
    }

    /// Every summary written for an owner, oldest first.
    pub async fn summaries(&self, owner_id: &str) -> Vec<ConversationSummary> {
        self.summaries
            .read()
            .await
            .iter()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TurnStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append_turn(&self, mut turn: ConversationTurn) -> Result<String, StoreError> {
        if turn.id.is_empty() {
            turn.id = Uuid::new_v4().to_string();
        }
        let id = turn.id.clone();
        self.turns.write().await.push(turn);
        Ok(id)
    }

    async fn list_turns(
        &self,
        owner_id: &str,
        query: TurnQuery,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let turns = self.turns.read().await;
        let mut owned: Vec<ConversationTurn> = turns
            .iter()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();

        // Stable sort keeps insertion order for equal timestamps
        owned.sort_by_key(|t| t.created_at);
        if query.order == SortOrder::NewestFirst {
            owned.reverse();
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(owned.into_iter().skip(query.offset).take(limit).collect())
    }

    async fn count_turns(&self, owner_id: &str) -> Result<usize, StoreError> {
        Ok(self
            .turns
            .read()
            .await
            .iter()
            .filter(|t| t.owner_id == owner_id)
            .count())
    }

    async fn delete_turns(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut turns = self.turns.write().await;
        let len_before = turns.len();
        turns.retain(|t| !ids.contains(&t.id));
        Ok(len_before - turns.len())
    }

    async fn latest_summary(
        &self,
        owner_id: &str,
    ) -> Result<Option<ConversationSummary>, StoreError> {
        let summaries = self.summaries.read().await;
        Ok(summaries
            .iter()
            .filter(|s| s.owner_id == owner_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn put_summary(&self, summary: ConversationSummary) -> Result<(), StoreError> {
        self.summaries.write().await.push(summary);
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for InMemoryStore {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.notifications.write().await.push(notification);
        Ok(())
    }
}
