//! Streaming exchange events.
//!
//! `ChatStreamEvent` wraps provider-level stream chunks into the events a
//! host forwards to its client (SSE, WebSocket, terminal):
//! - `chunk` — partial text from the model, forwarded as soon as it arrives
//! - `done`  — the exchange finished and both turns were persisted
//! - `error` — the exchange failed; the stream ends after this event

use crate::orchestrator::ExchangeMetadata;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// Partial text from the model.
    Chunk { content: String },

    /// The stream is complete.
    Done {
        /// Id of the persisted assistant turn.
        id: String,
        metadata: ExchangeMetadata,
    },

    /// The exchange failed. Always the last event.
    Error { message: String },
}

impl ChatStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Intent;

    #[test]
    fn event_serialization_chunk() {
        let event = ChatStreamEvent::Chunk {
            content: "Lower".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Lower""#));
    }

    #[test]
    fn event_serialization_done() {
        let event = ChatStreamEvent::Done {
            id: "turn-1".into(),
            metadata: ExchangeMetadata {
                intent: Intent::Question,
                is_emergency: false,
                tokens_used: 42,
                context_sources: vec!["active_grow".into()],
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""intent":"question""#));
        assert!(json.contains(r#""tokens_used":42"#));
    }

    #[test]
    fn event_types_and_terminality() {
        let chunk = ChatStreamEvent::Chunk { content: "x".into() };
        let error = ChatStreamEvent::Error { message: "boom".into() };
        assert_eq!(chunk.event_type(), "chunk");
        assert_eq!(error.event_type(), "error");
        assert!(!chunk.is_terminal());
        assert!(error.is_terminal());
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"error","message":"model unavailable"}"#;
        let event: ChatStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            ChatStreamEvent::Error { message } => assert_eq!(message, "model unavailable"),
            _ => panic!("Wrong variant"),
        }
    }
}
