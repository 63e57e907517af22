//! Memory compaction — folds old turns into a running summary.
//!
//! After every persisted exchange the orchestrator asks the [`Compactor`]
//! whether the owner's stored turn count has reached a multiple of
//! `summarize_every`. If it has, every turn except the most recent
//! `max_history_messages` is merged with the previous summary by the model,
//! the new summary is written, and exactly the folded turns are deleted by
//! id. Turns written concurrently after the fold set was loaded survive
//! and are picked up by the next cycle.
//!
//! Compaction is best-effort: [`Compactor::maybe_compact`] logs and swallows
//! every failure.

use crate::memory::ConversationMemory;
use crate::settings::EngineSettings;
use canopy_core::error::{ProviderError, StoreError};
use canopy_core::event::{DomainEvent, EventBus};
use canopy_core::message::{ConversationSummary, ConversationTurn, Message};
use canopy_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const SUMMARIZER_SYSTEM_PROMPT: &str =
    "You are a conversation summarizer. Output only the summary, nothing else.";

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("Store error during compaction: {0}")]
    Store(#[from] StoreError),

    #[error("Summary generation failed: {0}")]
    Model(#[from] ProviderError),

    #[error("Model returned an empty summary")]
    EmptySummary,
}

/// Outcome of one compaction cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    /// Turns merged into the new summary (its `folded_turn_count`).
    pub folded_turns: usize,
    /// Turns actually removed from the store.
    pub deleted_turns: usize,
    /// Whether a previous summary was merged in.
    pub merged_previous: bool,
}

/// Whether a stored turn count triggers compaction.
pub fn should_compact(total_turns: usize, summarize_every: usize) -> bool {
    summarize_every > 0 && total_turns > 0 && total_turns % summarize_every == 0
}

/// Build the merge prompt for the summarizer.
pub fn build_summary_prompt(
    previous: Option<&str>,
    to_fold: &[ConversationTurn],
    word_cap: usize,
) -> String {
    let conversation = to_fold
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.content))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "Summarize the following conversation between a home grower and Canopy, \
         their cultivation assistant. Preserve key facts: strain, issues discussed, \
         advice given, environmental readings mentioned, and any ongoing concerns.\n\
         Keep the summary concise (under {word_cap} words).\n\n"
    );
    match previous {
        Some(summary) => {
            prompt.push_str(&format!(
                "Previous summary:\n{summary}\n\nNew messages to integrate:\n{conversation}"
            ));
        }
        None => prompt.push_str(&format!("Conversation:\n{conversation}")),
    }
    prompt
}

#[derive(Clone)]
pub struct Compactor {
    memory: ConversationMemory,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    keep_recent: usize,
    summarize_every: usize,
    word_cap: usize,
    events: Option<Arc<EventBus>>,
}

impl Compactor {
    pub fn new(
        memory: ConversationMemory,
        provider: Arc<dyn Provider>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            memory,
            provider,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.chat.max_output_tokens,
            keep_recent: settings.chat.max_history_messages,
            summarize_every: settings.chat.summarize_every,
            word_cap: settings.chat.summary_word_cap,
            events: None,
        }
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run a cycle if the owner's turn count calls for one.
    ///
    /// Never fails. Returns the report when a cycle completed.
    pub async fn maybe_compact(&self, owner_id: &str) -> Option<CompactionReport> {
        let total = match self.memory.count(owner_id).await {
            Ok(n) => n,
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "Compaction check failed");
                return None;
            }
        };
        if !should_compact(total, self.summarize_every) {
            return None;
        }

        info!(owner_id = %owner_id, total, "Triggering conversation compaction");
        match self.compact(owner_id).await {
            Ok(report) => report,
            Err(e) => {
                error!(owner_id = %owner_id, error = %e, "Conversation compaction failed");
                if let Some(bus) = &self.events {
                    bus.publish(DomainEvent::ErrorOccurred {
                        context: format!("compaction:{owner_id}"),
                        error_message: e.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                }
                None
            }
        }
    }

    /// Fold everything but the recent window into a new summary.
    ///
    /// `Ok(None)` when the log is no longer than the window.
    pub async fn compact(&self, owner_id: &str) -> Result<Option<CompactionReport>, CompactionError> {
        let turns = self.memory.all_turns(owner_id).await?;
        if turns.len() <= self.keep_recent {
            debug!(owner_id = %owner_id, turns = turns.len(), "Nothing to compact");
            return Ok(None);
        }

        let split = turns.len() - self.keep_recent;
        let to_fold = &turns[..split];
        let fold_ids: Vec<String> = to_fold.iter().map(|t| t.id.clone()).collect();

        let previous = self.memory.summary_text(owner_id).await?;
        let prompt = build_summary_prompt(previous.as_deref(), to_fold, self.word_cap);

        let request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::system(SUMMARIZER_SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_output_tokens);

        let response = self.provider.complete(request).await?;
        let summary = response.message.content.trim().to_string();
        if summary.is_empty() {
            return Err(CompactionError::EmptySummary);
        }

        self.memory
            .put_summary(ConversationSummary::new(owner_id, summary, fold_ids.len()))
            .await?;
        let deleted = self.memory.delete(&fold_ids).await?;
        if deleted != fold_ids.len() {
            warn!(
                owner_id = %owner_id,
                expected = fold_ids.len(),
                deleted,
                "Some folded turns were already gone"
            );
        }

        info!(owner_id = %owner_id, folded = fold_ids.len(), "Conversation compacted");
        if let Some(bus) = &self.events {
            bus.publish(DomainEvent::ConversationCompacted {
                owner_id: owner_id.to_string(),
                folded_turns: fold_ids.len(),
                timestamp: chrono::Utc::now(),
            });
        }

        Ok(Some(CompactionReport {
            folded_turns: fold_ids.len(),
            deleted_turns: deleted,
            merged_previous: previous.is_some(),
        }))
    }
}
