//! Turn, summary, and model-message value types.
//!
//! These are the records that flow through the conversation engine:
//! user sends a message → engine assembles context → provider generates a
//! reply → both sides are appended to the owner's turn log as
//! [`ConversationTurn`]s, and old turns are eventually folded into a
//! [`ConversationSummary`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The grower
    User,
    /// The assistant
    Assistant,
    /// System instructions and injected context
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Parse the lowercase wire name. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role-tagged text block sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// One persisted message in an owner's conversation log.
///
/// Turns are immutable once written. The only lifecycle event after
/// creation is deletion when compaction folds them into a summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Unique turn ID
    pub id: String,

    /// The end-user identity that owns the conversation
    pub owner_id: String,

    /// Who sent this turn
    pub role: Role,

    /// The text content
    pub content: String,

    /// Free-form metadata (intent, token usage, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub tags: serde_json::Map<String, serde_json::Value>,

    /// Creation timestamp; the log is ordered by this field
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a new turn stamped with a fresh id and the current time.
    pub fn new(owner_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            role,
            content: content.into(),
            tags: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach a metadata tag.
    pub fn with_tag(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    /// View this turn as a model message.
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// A model-generated condensation of turns that have been folded away.
///
/// Only the most recent summary per owner is authoritative; each new one
/// is produced by merging the previous summary with newly folded turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub owner_id: String,
    pub summary_text: String,
    /// Number of turns deleted by the compaction that produced this summary
    pub folded_turn_count: usize,
    pub created_at: DateTime<Utc>,
}

impl ConversationSummary {
    pub fn new(owner_id: impl Into<String>, summary_text: impl Into<String>, folded: usize) -> Self {
        Self {
            owner_id: owner_id.into(),
            summary_text: summary_text.into(),
            folded_turn_count: folded,
            created_at: Utc::now(),
        }
    }
}
