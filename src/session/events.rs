//! Session change notifications

use crate::chat::{MessageId, MessageStatus};

/// Emitted after each mutation. `version` is the store version once the
/// mutation has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    MessageAdded {
        version: u64,
        id: MessageId,
    },
    ContentDelta {
        version: u64,
        id: MessageId,
        delta: String,
    },
    StatusChanged {
        version: u64,
        id: MessageId,
        status: MessageStatus,
    },
    /// Content replaced by an edit
    Edited {
        version: u64,
        id: MessageId,
    },
    Truncated {
        version: u64,
        after: MessageId,
        removed: Vec<MessageId>,
    },
    /// Undo, redo or clear replaced the whole message list
    HistoryRestored {
        version: u64,
    },
    ModelChanged {
        model_id: String,
        provider_id: String,
    },
}
