//! Prompt Messages
//!
//! The chat format handed to an [`LlmProvider`](crate::provider::LlmProvider).
//! Agents never store these directly; the reasoning engine renders them from
//! the agent's memory turns right before each call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System framing/instructions
    System,
    /// Goal, observations and feedback
    User,
    /// Model output
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a prompt
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Estimate token count (rough approximation)
    pub fn estimate_tokens(&self) -> u32 {
        estimate_tokens(&self.content).saturating_add(4) // role overhead
    }
}

/// ~4 characters per token is a rough estimate
pub fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.len() / 4).unwrap_or(u32::MAX)
}

/// Estimate total tokens in a prompt
pub fn estimate_prompt_tokens(messages: &[Message]) -> u32 {
    messages
        .iter()
        .map(Message::estimate_tokens)
        .fold(0, u32::saturating_add)
}
