//! Chat message types.
//!
//! Clients can send `content` either as a plain string or as arbitrary
//! structured JSON (OpenAI multi-part content, vendor extensions). Both are
//! accepted via an `#[serde(untagged)]` enum; `to_plaintext` gives the lossy
//! textual form used for token estimation and summarization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a chat participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }
}

/// Either a string shorthand or structured content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Data(Value),
}

impl MessageContent {
    /// Borrow the content when it is plain text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(s) => Some(s),
            MessageContent::Data(_) => None,
        }
    }

    /// Lossy plain-text representation (structured content is serialized).
    pub fn to_plaintext(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Data(v) => v.to_string(),
        }
    }
}
