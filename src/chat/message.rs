//! Message types

use super::status::MessageStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Creation-order unique message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message in the conversation forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Message this one replies to; `None` for a root
    pub parent_id: Option<MessageId>,
    /// Logical chronological order, independent of storage position
    pub sequence: u64,
    pub status: MessageStatus,
    /// True only while an assistant message is receiving deltas
    pub is_streaming: bool,
    pub provider_id: String,
    pub model_id: String,
}

impl Message {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The `{role, content}` pair a provider needs
    pub fn to_context(&self) -> ContextMessage {
        ContextMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Fields supplied by the caller when creating a message.
///
/// Id, sequence, status and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub parent_id: Option<MessageId>,
    pub provider_id: String,
    pub model_id: String,
}

impl NewMessage {
    pub fn user(
        content: impl Into<String>,
        parent_id: Option<MessageId>,
        provider_id: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            parent_id,
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }

    /// Empty assistant placeholder replying to `parent_id`
    pub fn assistant(
        parent_id: MessageId,
        provider_id: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            parent_id: Some(parent_id),
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }
}

/// Minimal message shape handed to provider adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl ContextMessage {
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
}
