//! Conversation model
//!
//! Messages form a forest: each message optionally replies to a parent,
//! and editing a message branches the conversation at that point. The
//! store owns the messages, the thread index answers parent/child
//! questions, and the history keeps whole-list snapshots for undo/redo.

mod history;
mod message;
mod status;
mod store;
mod thread;

#[cfg(test)]
mod proptests;

pub use history::History;
pub use message::{ContextMessage, Message, MessageId, NewMessage, Role};
pub use status::{transition, MessageStatus, TransitionError};
pub use store::{MessageStore, StoreError};
pub use thread::{BrokenChain, ChainBreak, ThreadIndex};
