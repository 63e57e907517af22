//! Context assembly pipeline and token budget allocator.
//!
//! Builds the model-ready turn list for one exchange from these blocks:
//!
//! 1. **Preamble** (persona, rules) — never trimmed
//! 2. **Grow** (structured cultivation state) — omitted when unavailable
//! 3. **Knowledge** (retrieved passages) — omitted when search fails
//! 4. **Summary** (latest conversation summary) — omitted when absent
//! 5. **History** (recent raw turns) — oldest dropped first to fit budget
//! 6. **User message** — always included
//!
//! Blocks 1–4 form the system message. Whatever input allowance remains
//! after the system message, the new message, and the reserved output
//! allowance goes to history.
//!
//! # Determinism
//!
//! For the same collaborator responses the assembled output is identical.
//! Budgeting uses only [`token::estimate_tokens`].

use crate::context::grow_context::GrowContextFormatter;
use crate::context::knowledge::KnowledgeRetriever;
use crate::context::preamble;
use crate::context::token;
use crate::memory::ConversationMemory;
use canopy_config::ChatConfig;
use canopy_core::message::{Message, Role};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ── Types ─────────────────────────────────────────────────────────────────

/// Input limits for one model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Model's maximum input size.
    pub model_max_input_tokens: usize,
    /// Held back for the model's answer.
    pub reserved_output_tokens: usize,
    /// Upper bound on raw turns fetched for the history block.
    pub max_history_messages: usize,
}

impl From<&ChatConfig> for TokenBudget {
    fn from(chat: &ChatConfig) -> Self {
        Self {
            model_max_input_tokens: chat.model_max_input_tokens,
            reserved_output_tokens: chat.reserved_output_tokens,
            max_history_messages: chat.max_history_messages,
        }
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

/// Which optional context blocks made it into the system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    ActiveGrow,
    KnowledgeBase,
    ChatSummary,
}

impl ContextSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActiveGrow => "active_grow",
            Self::KnowledgeBase => "knowledge_base",
            Self::ChatSummary => "chat_summary",
        }
    }
}

/// The assembled context, ready for a model call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// Preamble plus injected context blocks.
    pub system_message: String,
    /// History turns that survived trimming, oldest first.
    pub history: Vec<Message>,
    /// The new user message.
    pub user_message: String,
    /// Blocks present in the system message, in injection order.
    pub sources: Vec<ContextSource>,
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    /// System message, then history, then the new user turn.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Message::system(self.system_message.clone()));
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(self.user_message.clone()));
        messages
    }

    /// Concatenated history content, used for usage reporting.
    pub fn history_text(&self) -> String {
        self.history.iter().map(|m| m.content.as_str()).collect()
    }
}

/// Detailed metadata about the assembly process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Estimated tokens of everything sent (system + history + user).
    pub total_tokens: usize,
    /// Allowance computed for the history block. May be zero or negative.
    pub history_budget: i64,
    /// Per-block statistics.
    pub per_layer: Vec<LayerStats>,
    /// Items dropped during budget enforcement.
    pub drops: Vec<DropInfo>,
}

/// Statistics for a single context block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStats {
    pub name: String,
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Information about items dropped from a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: String,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

/// Result of fitting history into its allowance.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    /// Kept turns, oldest first. Always a suffix of the input.
    pub messages: Vec<Message>,
    pub tokens: usize,
    pub dropped: usize,
    pub tokens_dropped: usize,
}

// ── Budget allocator ──────────────────────────────────────────────────────

/// Keep the newest turns whose combined cost fits `budget`.
///
/// Walks newest → oldest and stops at the first turn that would overflow,
/// so the result is a contiguous suffix in chronological order. A budget
/// of zero or less yields no history.
pub fn trim_history_to_budget(turns: &[Message], budget: i64) -> HistoryWindow {
    let all_tokens = || turns.iter().map(|m| token::estimate_tokens(&m.content)).sum();
    if budget <= 0 {
        return HistoryWindow {
            messages: Vec::new(),
            tokens: 0,
            dropped: turns.len(),
            tokens_dropped: all_tokens(),
        };
    }
    let budget = budget as usize;

    let mut used = 0;
    let mut keep_from = turns.len();
    for (i, msg) in turns.iter().enumerate().rev() {
        let cost = token::estimate_tokens(&msg.content);
        if used + cost > budget {
            break;
        }
        used += cost;
        keep_from = i;
    }

    let dropped = &turns[..keep_from];
    HistoryWindow {
        messages: turns[keep_from..].to_vec(),
        tokens: used,
        dropped: dropped.len(),
        tokens_dropped: dropped
            .iter()
            .map(|m| token::estimate_tokens(&m.content))
            .sum(),
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Gathers context for an exchange. Cheap to clone.
#[derive(Clone)]
pub struct ContextAssembler {
    preamble: String,
    budget: TokenBudget,
    memory: ConversationMemory,
    grow: Option<std::sync::Arc<GrowContextFormatter>>,
    knowledge: Option<std::sync::Arc<KnowledgeRetriever>>,
}

impl ContextAssembler {
    pub fn new(memory: ConversationMemory, budget: TokenBudget) -> Self {
        Self {
            preamble: preamble::DEFAULT_PREAMBLE.to_string(),
            budget,
            memory,
            grow: None,
            knowledge: None,
        }
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    pub fn with_grow_context(mut self, formatter: GrowContextFormatter) -> Self {
        self.grow = Some(std::sync::Arc::new(formatter));
        self
    }

    pub fn with_knowledge(mut self, retriever: KnowledgeRetriever) -> Self {
        self.knowledge = Some(std::sync::Arc::new(retriever));
        self
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    /// Assemble context for `message` from `owner_id`.
    ///
    /// Never fails: a collaborator error only removes its block.
    pub async fn assemble(
        &self,
        owner_id: &str,
        message: &str,
        grow_id: Option<&str>,
    ) -> AssembledContext {
        let mut stats: Vec<LayerStats> = Vec::new();
        let mut drops: Vec<DropInfo> = Vec::new();
        let mut sources: Vec<ContextSource> = Vec::new();
        let mut context_parts: Vec<String> = Vec::new();

        // ── Block 1: Preamble ──────────────────────────────────────────────
        stats.push(LayerStats {
            name: "system".into(),
            tokens: token::estimate_tokens(&self.preamble),
            items_included: 1,
            items_total: 1,
        });

        // ── Block 2: Grow ──────────────────────────────────────────────────
        if let Some(formatter) = &self.grow {
            match formatter.build(owner_id, grow_id).await {
                Ok(Some(ctx)) => {
                    stats.push(Self::single_stats("grow", &ctx.text));
                    context_parts.push(ctx.text);
                    sources.push(ContextSource::ActiveGrow);
                }
                Ok(None) => stats.push(Self::empty_stats("grow", 0)),
                Err(e) => {
                    // Only the grow block is lost; knowledge retrieval below still runs
                    warn!(owner_id = %owner_id, error = %e, "Grow lookup failed, continuing without it");
                    stats.push(Self::empty_stats("grow", 0));
                }
            }
        }

        // ── Block 3: Knowledge ─────────────────────────────────────────────
        if let Some(retriever) = &self.knowledge {
            match retriever.retrieve(message).await {
                Ok(block) if !block.is_empty() => {
                    let section = format!("{}\n{}", preamble::KNOWLEDGE_HEADING, block.text);
                    stats.push(LayerStats {
                        name: "knowledge".into(),
                        tokens: token::estimate_tokens(&section),
                        items_included: block.included,
                        items_total: block.retrieved,
                    });
                    if block.retrieved > block.included {
                        drops.push(DropInfo {
                            layer: "knowledge".into(),
                            items_dropped: block.retrieved - block.included,
                            tokens_dropped: 0,
                            reason: "Lower-similarity passages exceeded the block allowance".into(),
                        });
                    }
                    context_parts.push(section);
                    sources.push(ContextSource::KnowledgeBase);
                }
                Ok(block) => stats.push(Self::empty_stats("knowledge", block.retrieved)),
                Err(e) => {
                    warn!(owner_id = %owner_id, error = %e, "Knowledge search failed, continuing without it");
                    stats.push(Self::empty_stats("knowledge", 0));
                }
            }
        }

        // ── Block 4: Summary ───────────────────────────────────────────────
        match self.memory.summary_text(owner_id).await {
            Ok(Some(summary)) => {
                let section = format!("{}\n{}", preamble::SUMMARY_HEADING, summary);
                stats.push(Self::single_stats("summary", &section));
                context_parts.push(section);
                sources.push(ContextSource::ChatSummary);
            }
            Ok(None) => stats.push(Self::empty_stats("summary", 0)),
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "Summary lookup failed, continuing without it");
                stats.push(Self::empty_stats("summary", 0));
            }
        }

        // ── Assemble system message ────────────────────────────────────────
        let system_message = if context_parts.is_empty() {
            self.preamble.clone()
        } else {
            format!(
                "{}\n\n{}\n{}",
                self.preamble,
                preamble::CONTEXT_HEADING,
                context_parts.join("\n\n")
            )
        };
        let system_tokens = token::estimate_tokens(&system_message);
        let user_tokens = token::estimate_tokens(message);

        // ── Block 5: History ───────────────────────────────────────────────
        let recent: Vec<Message> = match self
            .memory
            .recent_turns(owner_id, self.budget.max_history_messages)
            .await
        {
            Ok(turns) => turns
                .iter()
                .filter(|t| t.role != Role::System)
                .map(|t| t.to_message())
                .collect(),
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "History lookup failed, continuing without it");
                Vec::new()
            }
        };

        let history_budget = self.budget.model_max_input_tokens as i64
            - system_tokens as i64
            - user_tokens as i64
            - self.budget.reserved_output_tokens as i64;
        let window = trim_history_to_budget(&recent, history_budget);

        stats.push(LayerStats {
            name: "history".into(),
            tokens: window.tokens,
            items_included: window.messages.len(),
            items_total: recent.len(),
        });
        if window.dropped > 0 {
            drops.push(DropInfo {
                layer: "history".into(),
                items_dropped: window.dropped,
                tokens_dropped: window.tokens_dropped,
                reason: "Oldest turns dropped to fit input budget".into(),
            });
        }

        // ── Block 6: User message ──────────────────────────────────────────
        stats.push(LayerStats {
            name: "user_message".into(),
            tokens: user_tokens,
            items_included: 1,
            items_total: 1,
        });

        let total_tokens = system_tokens + window.tokens + user_tokens;
        debug!(
            owner_id = %owner_id,
            total_tokens,
            history_budget,
            history_kept = window.messages.len(),
            history_dropped = window.dropped,
            "Context assembled"
        );

        AssembledContext {
            system_message,
            history: window.messages,
            user_message: message.to_string(),
            sources,
            metadata: AssemblyMetadata {
                total_tokens,
                history_budget,
                per_layer: stats,
                drops,
            },
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────────

    fn single_stats(layer: &str, text: &str) -> LayerStats {
        LayerStats {
            name: layer.into(),
            tokens: token::estimate_tokens(text),
            items_included: 1,
            items_total: 1,
        }
    }

    fn empty_stats(layer: &str, total: usize) -> LayerStats {
        LayerStats {
            name: layer.into(),
            tokens: 0,
            items_included: 0,
            items_total: total,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::grow_context::GrowContextFormatter;
    use crate::context::knowledge::{KnowledgeRetriever, RetrievalSettings};
    use crate::test_helpers::{FailingGrowState, FailingKnowledge, FixedKnowledge};
    use canopy_core::grow::{Grow, GrowStatus};
    use canopy_core::message::{ConversationSummary, ConversationTurn};
    use canopy_core::store::TurnStore;
    use canopy_memory::{InMemoryGrowRegistry, InMemoryStore};
    use std::sync::Arc;

    // ── Helpers ────────────────────────────────────────────────────────

    fn turns(contents: &[&str]) -> Vec<Message> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i % 2 == 0 {
                    Message::user(*c)
                } else {
                    Message::assistant(*c)
                }
            })
            .collect()
    }

    async fn seeded_store(owner: &str, n: usize) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..n {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store
                .append_turn(ConversationTurn::new(owner, role, format!("turn {i}")))
                .await
                .unwrap();
        }
        store
    }

    fn sample_grow(owner: &str) -> Grow {
        Grow {
            id: "g1".into(),
            owner_id: owner.into(),
            name: "Balcony".into(),
            strain_name: Some("Gorilla Glue".into()),
            medium: None,
            current_phase: Some("vegetative".into()),
            start_date: None,
            light_type: None,
            light_wattage: None,
            space_cm: None,
            status: GrowStatus::Active,
            plan: None,
            created_at: chrono::Utc::now(),
        }
    }

    // ── Allocator ──────────────────────────────────────────────────────

    #[test]
    fn non_positive_budget_yields_no_history() {
        let history = turns(&["a", "b", "c"]);
        for budget in [0, -1, -5000] {
            let window = trim_history_to_budget(&history, budget);
            assert!(window.messages.is_empty());
            assert_eq!(window.dropped, 3);
        }
    }

    #[test]
    fn everything_fits_in_order() {
        let history = turns(&["one", "two", "three"]);
        let window = trim_history_to_budget(&history, 1000);
        assert_eq!(window.messages, history);
        assert_eq!(window.dropped, 0);
    }

    #[test]
    fn keeps_contiguous_newest_suffix() {
        // 40, 4, 40, 4 tokens
        let big = "x".repeat(160);
        let history = turns(&[&big, "tiny", &big, "tiny"]);
        let window = trim_history_to_budget(&history, 50);
        assert_eq!(window.messages, history[1..].to_vec());
        assert_eq!(window.tokens, 42);
        assert_eq!(window.dropped, 1);
        assert_eq!(window.tokens_dropped, 40);
    }

    #[test]
    fn stops_at_first_overflow_without_skipping() {
        // Oldest is tiny, middle is huge, newest is tiny
        let huge = "y".repeat(400);
        let history = turns(&["ok", &huge, "ok"]);
        let window = trim_history_to_budget(&history, 10);
        // Only the newest survives; the tiny oldest turn is not pulled in past the gap
        assert_eq!(window.messages, vec![history[2].clone()]);
        assert_eq!(window.dropped, 2);
    }

    #[test]
    fn never_exceeds_budget() {
        let history: Vec<Message> = (0..20)
            .map(|i| Message::user("z".repeat(i * 7 + 1)))
            .collect();
        for budget in [1, 5, 17, 60, 123, 400] {
            let window = trim_history_to_budget(&history, budget);
            assert!(window.tokens as i64 <= budget);
            let start = history.len() - window.messages.len();
            assert_eq!(window.messages, history[start..].to_vec());
        }
    }

    // ── Assembler ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn fresh_owner_gets_preamble_only() {
        let store = Arc::new(InMemoryStore::new());
        let assembler = ContextAssembler::new(ConversationMemory::new(store), TokenBudget::default())
            .with_grow_context(GrowContextFormatter::new(Arc::new(InMemoryGrowRegistry::new())));

        let ctx = assembler.assemble("new-owner", "My plants are dying, help!", None).await;
        assert_eq!(ctx.system_message, preamble::DEFAULT_PREAMBLE);
        assert!(ctx.sources.is_empty());
        assert!(ctx.history.is_empty());

        let messages = ctx.to_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "My plants are dying, help!");
    }

    #[tokio::test]
    async fn full_window_kept_when_budget_allows() {
        let store = seeded_store("grower", 10).await;
        let assembler =
            ContextAssembler::new(ConversationMemory::new(store), TokenBudget::default());

        let ctx = assembler.assemble("grower", "next question", None).await;
        assert_eq!(ctx.history.len(), 10);
        let contents: Vec<_> = ctx.history.iter().map(|m| m.content.clone()).collect();
        let expected: Vec<_> = (0..10).map(|i| format!("turn {i}")).collect();
        assert_eq!(contents, expected);
        assert!(ctx.metadata.drops.is_empty());
    }

    #[tokio::test]
    async fn window_limited_to_max_history() {
        let store = seeded_store("grower", 14).await;
        let budget = TokenBudget {
            max_history_messages: 4,
            ..TokenBudget::default()
        };
        let assembler = ContextAssembler::new(ConversationMemory::new(store), budget);

        let ctx = assembler.assemble("grower", "hi", None).await;
        let contents: Vec<_> = ctx.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 10", "turn 11", "turn 12", "turn 13"]);
    }

    #[tokio::test]
    async fn reserved_output_can_starve_history() {
        let store = seeded_store("grower", 6).await;
        let budget = TokenBudget {
            model_max_input_tokens: 500,
            reserved_output_tokens: 4096,
            max_history_messages: 10,
        };
        let assembler = ContextAssembler::new(ConversationMemory::new(store), budget);

        let ctx = assembler.assemble("grower", "hello", None).await;
        assert!(ctx.metadata.history_budget <= 0);
        assert!(ctx.history.is_empty());
        assert_eq!(ctx.metadata.drops[0].items_dropped, 6);
    }

    #[tokio::test]
    async fn blocks_injected_in_order() {
        let store = seeded_store("grower", 2).await;
        store
            .put_summary(ConversationSummary::new("grower", "Grower uses coco, had a pH swing.", 8))
            .await
            .unwrap();
        let registry = InMemoryGrowRegistry::new();
        registry.upsert_grow(sample_grow("grower")).await;

        let assembler = ContextAssembler::new(ConversationMemory::new(store), TokenBudget::default())
            .with_grow_context(GrowContextFormatter::new(Arc::new(registry)))
            .with_knowledge(KnowledgeRetriever::new(
                Arc::new(FixedKnowledge::single("Topping", "Top above the fifth node.")),
                RetrievalSettings::default(),
            ));

        let ctx = assembler.assemble("grower", "when should I top?", None).await;
        assert_eq!(
            ctx.sources,
            vec![
                ContextSource::ActiveGrow,
                ContextSource::KnowledgeBase,
                ContextSource::ChatSummary
            ]
        );
        let grow = ctx.system_message.find("## Active Grow: Balcony").unwrap();
        let knowledge = ctx.system_message.find("### Topping").unwrap();
        let summary = ctx.system_message.find("had a pH swing").unwrap();
        assert!(ctx.system_message.contains(preamble::CONTEXT_HEADING));
        assert!(grow < knowledge && knowledge < summary);
    }

    #[tokio::test]
    async fn failing_collaborators_only_drop_their_blocks() {
        let store = seeded_store("grower", 2).await;
        let assembler = ContextAssembler::new(ConversationMemory::new(store), TokenBudget::default())
            .with_grow_context(GrowContextFormatter::new(Arc::new(FailingGrowState)))
            .with_knowledge(KnowledgeRetriever::new(
                Arc::new(FailingKnowledge),
                RetrievalSettings::default(),
            ));

        let ctx = assembler.assemble("grower", "how is it going?", None).await;
        assert!(ctx.sources.is_empty());
        assert_eq!(ctx.history.len(), 2);
    }

    #[tokio::test]
    async fn grow_failure_keeps_knowledge_block() {
        let store = Arc::new(InMemoryStore::new());
        let assembler = ContextAssembler::new(ConversationMemory::new(store), TokenBudget::default())
            .with_grow_context(GrowContextFormatter::new(Arc::new(FailingGrowState)))
            .with_knowledge(KnowledgeRetriever::new(
                Arc::new(FixedKnowledge::single("Topping", "Top above the fifth node.")),
                RetrievalSettings::default(),
            ));

        let ctx = assembler.assemble("grower", "when should I top?", None).await;
        assert_eq!(ctx.sources, vec![ContextSource::KnowledgeBase]);
        assert!(ctx.system_message.contains("Top above the fifth node."));
    }

    #[tokio::test]
    async fn custom_preamble_is_used() {
        let store = Arc::new(InMemoryStore::new());
        let assembler = ContextAssembler::new(ConversationMemory::new(store), TokenBudget::default())
            .with_preamble("You are terse.");
        let ctx = assembler.assemble("o", "hi", None).await;
        assert_eq!(ctx.system_message, "You are terse.");
        assert_eq!(ctx.metadata.total_tokens, 4 + 1);
    }
}
