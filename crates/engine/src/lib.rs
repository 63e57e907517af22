//! The Canopy conversation engine.
//!
//! Turns a grower's message into a model-ready context and an answer:
//!
//! 1. **Classify** the message's intent and urgency
//! 2. **Assemble** context from grow state, knowledge, summary and recent turns
//! 3. **Budget** the context so it fits the model's input limit
//! 4. **Answer** through a blocking or streaming model call
//! 5. **Compact** old turns into a running summary as the log grows
//!
//! [`ChatOrchestrator`] is the entry point; everything else is usable on
//! its own.

pub mod classifier;
pub mod compaction;
pub mod context;
pub mod memory;
pub mod orchestrator;
pub mod settings;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use classifier::{Classification, Intent, classify};
pub use compaction::{CompactionError, CompactionReport, Compactor};
pub use context::{
    AssembledContext, AssemblyMetadata, ContextAssembler, ContextSource, DropInfo, LayerStats,
    TokenBudget,
};
pub use memory::{ConversationMemory, HistoryPage};
pub use orchestrator::{ChatError, ChatOrchestrator, ChatReply, ExchangeMetadata};
pub use settings::EngineSettings;
pub use stream_event::ChatStreamEvent;
