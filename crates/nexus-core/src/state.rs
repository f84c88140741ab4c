//! UI-agnostic conversation state types
//!
//! These are shared between the controller, the history store and whatever
//! front-end renders the conversation. The serde layout is the on-disk
//! history format: `{ id, content, sender, timestamp, isError? }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Text shown in place of a reply when the completion request fails
pub const ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";

/// A single chat message. Never mutated once appended to a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    /// Older history files call the model side `"ai"`
    #[serde(alias = "ai")]
    Assistant,
}

impl Message {
    fn new(sender: Sender, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            content: content.into(),
            sender,
            timestamp: Utc::now(),
            is_error,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Sender::User, content, false)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, content, false)
    }

    /// Placeholder reply for a failed exchange
    pub fn error_reply() -> Self {
        Self::new(Sender::Assistant, ERROR_REPLY, true)
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = Message::user("one");
        let b = Message::user("one");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_serialized_field_names() {
        let msg = Message::assistant("Hello!");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["sender"], "assistant");
        assert_eq!(value["content"], "Hello!");
        assert!(value.get("isError").is_none());
        assert!(value["timestamp"].is_string());

        let value = serde_json::to_value(Message::error_reply()).unwrap();
        assert_eq!(value["isError"], true);
        assert_eq!(value["content"], ERROR_REPLY);
    }

    #[test]
    fn test_legacy_ai_sender_loads_as_assistant() {
        let json = r#"{
            "id": "1717000000000",
            "content": "Hi there",
            "sender": "ai",
            "timestamp": "2024-05-29T16:26:40.000Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.sender, Sender::Assistant);
        assert!(!msg.is_error);
    }
}
