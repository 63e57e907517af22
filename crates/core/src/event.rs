//! Domain event system — decoupled observation of conversation activity.
//!
//! The engine publishes events when an exchange finishes, when a
//! conversation is compacted, and when an emergency is escalated. Other
//! components subscribe to react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An exchange produced an answer for the owner
    ExchangeCompleted {
        owner_id: String,
        intent: String,
        tokens_used: usize,
        streamed: bool,
        timestamp: DateTime<Utc>,
    },

    /// Old turns were folded into a new summary
    ConversationCompacted {
        owner_id: String,
        folded_turns: usize,
        timestamp: DateTime<Utc>,
    },

    /// An emergency message triggered an alert
    EmergencyEscalated {
        owner_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A non-fatal failure was absorbed
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
