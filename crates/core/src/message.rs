//! Message and Session domain types.
//!
//! These are the value objects that flow through the entire system:
//! the caller supplies messages, the reactive loop accumulates them, and
//! the provider consumes them on every round-trip.

use serde::{Deserialize, Serialize};

/// The role of a message author in a conversation.
///
/// `"agent"` is accepted as an input synonym for `assistant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The LLM
    #[serde(alias = "agent")]
    Assistant,
    /// System instructions
    System,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who authored this message
    pub role: Role,

    /// The text content
    pub content: String,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Whether the content is empty (such messages are dropped on ingest).
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// An ordered, finite sequence of messages.
pub type Session = Vec<Message>;

/// Drop empty-content messages from caller input.
pub fn sanitize(messages: impl IntoIterator<Item = Message>) -> Session {
    messages.into_iter().filter(|m| !m.is_empty()).collect()
}
