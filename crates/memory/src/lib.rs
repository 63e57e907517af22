//! Persistence and retrieval implementations for Canopy.
//!
//! - [`InMemoryStore`] and [`SqliteStore`] implement the turn log, summaries
//!   and notification sink.
//! - [`InMemoryGrowRegistry`] and [`SqliteStore`] implement grow state.
//! - [`InMemoryKnowledgeIndex`] implements semantic knowledge search.

pub mod grow_registry;
pub mod in_memory;
pub mod knowledge;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use grow_registry::InMemoryGrowRegistry;
pub use in_memory::InMemoryStore;
pub use knowledge::{InMemoryKnowledgeIndex, KnowledgeDocument};
pub use vector::{cosine_similarity, vector_search};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
