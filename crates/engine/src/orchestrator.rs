//! Conversation orchestrator — the engine's entry point.
//!
//! One exchange runs strictly in sequence:
//!
//! 1. **Classify** the message (intent, urgency)
//! 2. **Assemble** context under the token budget
//! 3. **Invoke** the model (blocking with retry, or streaming without)
//! 4. **Persist** the user and assistant turns, each independently
//! 5. **Compact** if the stored turn count calls for it
//! 6. **Escalate** emergencies to the notification sink
//!
//! Only a model failure aborts the exchange. Everything after the model
//! answered is best-effort and logged, since the grower already has their
//! answer.

use crate::classifier::{Classification, Intent, classify};
use crate::compaction::Compactor;
use crate::context::assembler::{AssembledContext, ContextAssembler, TokenBudget};
use crate::context::grow_context::GrowContextFormatter;
use crate::context::knowledge::KnowledgeRetriever;
use crate::context::token;
use crate::memory::{ConversationMemory, HistoryPage};
use crate::settings::EngineSettings;
use crate::stream_event::ChatStreamEvent;
use canopy_core::error::{ProviderError, StoreError};
use canopy_core::event::{DomainEvent, EventBus};
use canopy_core::grow::GrowStateProvider;
use canopy_core::knowledge::KnowledgeSearch;
use canopy_core::message::{ConversationTurn, Role};
use canopy_core::notify::{Notification, NotificationSink};
use canopy_core::provider::{Provider, ProviderRequest};
use canopy_core::store::TurnStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// Title of emergency notifications.
pub const EMERGENCY_TITLE: &str = "🚨 Canopy Emergency Alert";

/// Capacity of the per-exchange event channel.
const STREAM_BUFFER: usize = 64;

// ── Types ─────────────────────────────────────────────────────────────────

/// Errors that reach the caller of the orchestrator.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("The assistant is temporarily unavailable, please try again ({0})")]
    ModelUnavailable(#[source] ProviderError),

    #[error("Conversation storage failed: {0}")]
    Storage(#[from] StoreError),
}

/// What the engine learned and spent on one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeMetadata {
    pub intent: Intent,
    pub is_emergency: bool,
    pub tokens_used: usize,
    /// Subset of `active_grow`, `knowledge_base`, `chat_summary`, in that order.
    pub context_sources: Vec<String>,
}

/// The assistant turn returned by [`ChatOrchestrator::process`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub metadata: ExchangeMetadata,
    pub created_at: DateTime<Utc>,
}

// ── Orchestrator ──────────────────────────────────────────────────────────

/// Runs exchanges for any number of owners. Cheap to clone.
#[derive(Clone)]
pub struct ChatOrchestrator {
    provider: Arc<dyn Provider>,
    memory: ConversationMemory,
    assembler: ContextAssembler,
    compactor: Compactor,
    notifier: Option<Arc<dyn NotificationSink>>,
    events: Option<Arc<EventBus>>,
    settings: EngineSettings,
}

impl ChatOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn TurnStore>,
        settings: EngineSettings,
    ) -> Self {
        let memory = ConversationMemory::new(store);
        let mut assembler = ContextAssembler::new(memory.clone(), TokenBudget::from(&settings.chat));
        if let Some(prompt) = &settings.chat.system_prompt {
            assembler = assembler.with_preamble(prompt.clone());
        }
        let compactor = Compactor::new(memory.clone(), provider.clone(), &settings);
        Self {
            provider,
            memory,
            assembler,
            compactor,
            notifier: None,
            events: None,
            settings,
        }
    }

    /// Inject structured grow state into the context.
    pub fn with_grow_state(mut self, state: Arc<dyn GrowStateProvider>) -> Self {
        self.assembler = self
            .assembler
            .with_grow_context(GrowContextFormatter::new(state));
        self
    }

    /// Inject knowledge base passages into the context.
    pub fn with_knowledge(mut self, search: Arc<dyn KnowledgeSearch>) -> Self {
        let retriever = KnowledgeRetriever::new(search, self.settings.retrieval.clone());
        self.assembler = self.assembler.with_knowledge(retriever);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.compactor = self.compactor.with_event_bus(events.clone());
        self.events = Some(events);
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.assembler = self.assembler.with_preamble(preamble);
        self
    }

    /// Answer one message and return the persisted assistant turn.
    pub async fn process(
        &self,
        owner_id: &str,
        message: &str,
        grow_id: Option<&str>,
    ) -> Result<ChatReply, ChatError> {
        let classification = self.classify(owner_id, message);
        let ctx = self.assembler.assemble(owner_id, message, grow_id).await;

        let response = self
            .provider
            .complete(self.request_for(&ctx))
            .await
            .map_err(|e| self.model_failure(owner_id, e))?;
        let content = response.message.content;

        let tokens_used = exchange_tokens(&ctx, &content);
        let assistant = self
            .finish_exchange(owner_id, message, &content, classification, tokens_used, false)
            .await;

        Ok(ChatReply {
            id: assistant.id,
            role: Role::Assistant,
            content,
            metadata: exchange_metadata(classification, tokens_used, &ctx),
            created_at: assistant.created_at,
        })
    }

    /// Answer one message as a stream of events.
    ///
    /// Fragments are forwarded as they arrive. Turns are persisted only
    /// after the model finishes, then a single `Done` closes the stream.
    /// A failure yields a single `Error` instead. Dropping the stream
    /// abandons the model call and persists nothing.
    pub fn stream(
        &self,
        owner_id: &str,
        message: &str,
        grow_id: Option<&str>,
    ) -> ReceiverStream<ChatStreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let this = self.clone();
        let owner_id = owner_id.to_string();
        let message = message.to_string();
        let grow_id = grow_id.map(str::to_string);

        tokio::spawn(async move {
            this.run_stream(&owner_id, &message, grow_id.as_deref(), tx)
                .await;
        });

        ReceiverStream::new(rx)
    }

    /// A page of the owner's stored turns, oldest first.
    pub async fn history(
        &self,
        owner_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<HistoryPage, ChatError> {
        Ok(self.memory.page(owner_id, limit, offset).await?)
    }

    // ── Exchange steps ─────────────────────────────────────────────────────

    fn classify(&self, owner_id: &str, message: &str) -> Classification {
        let classification = classify(message);
        info!(
            owner_id = %owner_id,
            intent = %classification.intent,
            is_emergency = classification.is_emergency,
            "Intent detected"
        );
        classification
    }

    fn request_for(&self, ctx: &AssembledContext) -> ProviderRequest {
        ProviderRequest::new(self.settings.model.clone(), ctx.to_messages())
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.chat.max_output_tokens)
    }

    fn model_failure(&self, owner_id: &str, e: ProviderError) -> ChatError {
        error!(owner_id = %owner_id, error = %e, "Model invocation failed");
        self.publish(DomainEvent::ErrorOccurred {
            context: format!("exchange:{owner_id}"),
            error_message: e.to_string(),
            timestamp: Utc::now(),
        });
        ChatError::ModelUnavailable(e)
    }

    async fn run_stream(
        &self,
        owner_id: &str,
        message: &str,
        grow_id: Option<&str>,
        tx: mpsc::Sender<ChatStreamEvent>,
    ) {
        let classification = self.classify(owner_id, message);
        let ctx = self.assembler.assemble(owner_id, message, grow_id).await;

        let mut chunks = match self.provider.stream(self.request_for(&ctx)).await {
            Ok(rx) => rx,
            Err(e) => {
                let err = self.model_failure(owner_id, e);
                let _ = tx.send(ChatStreamEvent::Error { message: err.to_string() }).await;
                return;
            }
        };

        let mut content = String::new();
        loop {
            tokio::select! {
                biased;
                _ = tx.closed() => {
                    info!(owner_id = %owner_id, "Client disconnected, abandoning stream");
                    return;
                }
                next = chunks.recv() => match next {
                    Some(Ok(chunk)) => {
                        if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                            content.push_str(&text);
                            if tx.send(ChatStreamEvent::Chunk { content: text }).await.is_err() {
                                info!(owner_id = %owner_id, "Client disconnected, abandoning stream");
                                return;
                            }
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        let err = self.model_failure(owner_id, e);
                        let _ = tx.send(ChatStreamEvent::Error { message: err.to_string() }).await;
                        return;
                    }
                    None => break,
                }
            }
        }

        let tokens_used = exchange_tokens(&ctx, &content);
        let assistant = self
            .finish_exchange(owner_id, message, &content, classification, tokens_used, true)
            .await;

        let _ = tx
            .send(ChatStreamEvent::Done {
                id: assistant.id,
                metadata: exchange_metadata(classification, tokens_used, &ctx),
            })
            .await;
    }

    /// Persist, compact, and escalate. Never fails.
    ///
    /// Returns the assistant turn, whether or not it was stored.
    async fn finish_exchange(
        &self,
        owner_id: &str,
        message: &str,
        content: &str,
        classification: Classification,
        tokens_used: usize,
        streamed: bool,
    ) -> ConversationTurn {
        let intent = classification.intent.as_str();
        let user_turn = ConversationTurn::new(owner_id, Role::User, message)
            .with_tag("intent", intent)
            .with_tag("is_emergency", classification.is_emergency);
        let assistant_turn = ConversationTurn::new(owner_id, Role::Assistant, content)
            .with_tag("intent", intent)
            .with_tag("tokens_used", tokens_used);

        let user_saved = self.persist(user_turn).await;
        let assistant_saved = self.persist(assistant_turn.clone()).await;

        if user_saved || assistant_saved {
            self.compactor.maybe_compact(owner_id).await;
        }

        if classification.is_emergency {
            self.escalate(owner_id, message, content).await;
        }

        self.publish(DomainEvent::ExchangeCompleted {
            owner_id: owner_id.to_string(),
            intent: intent.to_string(),
            tokens_used,
            streamed,
            timestamp: Utc::now(),
        });

        assistant_turn
    }

    async fn persist(&self, turn: ConversationTurn) -> bool {
        let role = turn.role;
        let owner_id = turn.owner_id.clone();
        match self.memory.append(turn).await {
            Ok(id) => {
                debug!(owner_id = %owner_id, turn_id = %id, role = role.as_str(), "Turn saved");
                true
            }
            Err(e) => {
                error!(owner_id = %owner_id, role = role.as_str(), error = %e, "Failed to save turn");
                false
            }
        }
    }

    async fn escalate(&self, owner_id: &str, message: &str, response: &str) {
        let Some(notifier) = &self.notifier else {
            warn!(owner_id = %owner_id, "Emergency detected but no notification sink is configured");
            return;
        };

        let chat = &self.settings.chat;
        let notification = Notification::new(
            owner_id,
            EMERGENCY_TITLE,
            truncate_with_ellipsis(response, chat.notification_body_chars),
            serde_json::json!({
                "type": "emergency_chat",
                "user_message": message.chars().take(chat.notification_message_chars).collect::<String>(),
            }),
        );

        match notifier.notify(notification).await {
            Ok(()) => {
                info!(owner_id = %owner_id, "Emergency notification created");
                self.publish(DomainEvent::EmergencyEscalated {
                    owner_id: owner_id.to_string(),
                    timestamp: Utc::now(),
                });
            }
            Err(e) => error!(owner_id = %owner_id, error = %e, "Failed to create emergency notification"),
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// Estimated cost of everything sent and received in one exchange.
fn exchange_tokens(ctx: &AssembledContext, response: &str) -> usize {
    let mut all = String::with_capacity(
        ctx.system_message.len() + ctx.user_message.len() + response.len(),
    );
    all.push_str(&ctx.system_message);
    all.push_str(&ctx.user_message);
    all.push_str(response);
    all.push_str(&ctx.history_text());
    token::estimate_tokens(&all)
}

fn exchange_metadata(
    classification: Classification,
    tokens_used: usize,
    ctx: &AssembledContext,
) -> ExchangeMetadata {
    ExchangeMetadata {
        intent: classification.intent,
        is_emergency: classification.is_emergency,
        tokens_used,
        context_sources: ctx.sources.iter().map(|s| s.as_str().to_string()).collect(),
    }
}

/// Keep at most `max_chars` characters, marking the cut with "...".
fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
