//! Session-level errors

use crate::catalog::ModelKind;
use crate::chat::{MessageId, MessageStatus, StoreError};
use crate::images::ImageError;
use crate::provider::ProviderError;
use crate::settings::SettingsError;
use crate::transport::TransportError;
use thiserror::Error;

/// Shown in place of the reply when a request fails
pub const FAILURE_TEXT: &str = "Sorry, the request failed. Please try again later.";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("message content must not be empty")]
    BlankContent,
    #[error("no model selected")]
    NoModelSelected,
    #[error("a request is already in flight")]
    Busy,
    #[error("unknown model {0}")]
    UnknownModel(String),
    #[error("model {model_id} is not a {expected} model")]
    WrongModelKind { model_id: String, expected: ModelKind },
    #[error("no adapter for provider {0}")]
    UnknownProvider(String),
    #[error("message {0} not found")]
    MessageNotFound(MessageId),
    #[error("message {0} is not a user message")]
    NotAUserMessage(MessageId),
    #[error("message {id} cannot be edited while {status}")]
    NotEditable { id: MessageId, status: MessageStatus },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// The request was cancelled; the reply keeps its partial content
    #[error("request for message {message_id} was cancelled")]
    Cancelled { message_id: MessageId },
    /// The transport failed; the reply now carries [`FAILURE_TEXT`]
    #[error("request for message {message_id} failed: {source}")]
    Transport {
        message_id: MessageId,
        #[source]
        source: TransportError,
    },
}

impl SessionError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SessionError::Cancelled { .. })
    }

    /// Text to surface to the user; cancellations are silent
    pub fn user_message(&self) -> Option<String> {
        match self {
            SessionError::Cancelled { .. } => None,
            SessionError::Transport { .. } => Some(FAILURE_TEXT.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Assistant message the failure was recorded on, if any
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            SessionError::Cancelled { message_id } | SessionError::Transport { message_id, .. } => {
                Some(*message_id)
            }
            _ => None,
        }
    }
}
