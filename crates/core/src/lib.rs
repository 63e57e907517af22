//! # Canopy Core
//!
//! Domain types, collaborator traits, and error definitions for the Canopy
//! grow assistant. This crate has **no framework dependencies**: it defines
//! the model that the storage, provider, and engine crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the conversation engine is a trait here:
//! - [`TurnStore`] — the turn log and summaries
//! - [`Provider`] — language-model invocation (blocking and streaming)
//! - [`KnowledgeSearch`] / [`Embedder`] — semantic retrieval
//! - [`GrowStateProvider`] — structured cultivation state
//! - [`NotificationSink`] — alert delivery
//!
//! Implementations live in their respective crates, which keeps the engine
//! testable with in-memory stand-ins.

pub mod error;
pub mod event;
pub mod grow;
pub mod knowledge;
pub mod message;
pub mod notify;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use grow::{Grow, GrowPlan, GrowStateProvider, PhasePlan, Snapshot};
pub use knowledge::{Embedder, KnowledgePassage, KnowledgeSearch};
pub use message::{ConversationSummary, ConversationTurn, Message, Role};
pub use notify::{Notification, NotificationSink};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use store::{SortOrder, TurnQuery, TurnStore};
