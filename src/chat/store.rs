//! Message store
//!
//! Flat message list plus the thread index over it. Every mutation bumps
//! `version` so observers can tell one state from the next.

use super::message::{ContextMessage, Message, MessageId, NewMessage};
use super::status::{transition, MessageStatus, TransitionError};
use super::thread::ThreadIndex;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Store mutation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("message {0} already exists")]
    DuplicateId(MessageId),
    #[error("message {id} references unknown parent {parent}")]
    UnknownParent { id: MessageId, parent: MessageId },
    #[error("message {0} not found")]
    NotFound(MessageId),
    #[error("message {id}: {source}")]
    Transition {
        id: MessageId,
        #[source]
        source: TransitionError,
    },
}

#[derive(Debug, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
    threads: ThreadIndex,
    next_id: u64,
    next_sequence: u64,
    version: u64,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            threads: ThreadIndex::new(),
            next_id: 1,
            next_sequence: 1,
            version: 0,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.threads.contains(id)
    }

    /// Messages in storage order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages in sequence order
    pub fn ordered(&self) -> Vec<&Message> {
        let mut ordered: Vec<&Message> = self.messages.iter().collect();
        ordered.sort_by_key(|m| m.sequence);
        ordered
    }

    /// Message with the highest sequence
    pub fn latest(&self) -> Option<&Message> {
        self.messages.iter().max_by_key(|m| m.sequence)
    }

    /// The message currently receiving deltas, if any
    pub fn streaming(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_streaming)
    }

    pub fn threads(&self) -> &ThreadIndex {
        &self.threads
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Provider context for `id`; see [`ThreadIndex::build_context`]
    pub fn build_context(&self, id: MessageId) -> Vec<ContextMessage> {
        self.threads.build_context(id, |ancestor| self.get(ancestor))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Materialize a new message with the next id and sequence.
    ///
    /// The message is not stored until passed to [`append`](Self::append).
    pub fn create(&mut self, new: NewMessage, timestamp: DateTime<Utc>) -> Message {
        let id = MessageId(self.next_id);
        let sequence = self.next_sequence;
        self.next_id += 1;
        self.next_sequence += 1;

        Message {
            id,
            status: MessageStatus::initial(new.role),
            role: new.role,
            content: new.content,
            timestamp,
            parent_id: new.parent_id,
            sequence,
            is_streaming: false,
            provider_id: new.provider_id,
            model_id: new.model_id,
        }
    }

    pub fn append(&mut self, message: Message) -> Result<(), StoreError> {
        if self.contains(message.id) {
            return Err(StoreError::DuplicateId(message.id));
        }
        if let Some(parent) = message.parent_id {
            if !self.contains(parent) {
                return Err(StoreError::UnknownParent {
                    id: message.id,
                    parent,
                });
            }
        }

        self.threads.insert(message.id, message.parent_id);
        self.bump_counters(message.id, message.sequence);
        self.messages.push(message);
        self.version += 1;
        Ok(())
    }

    /// Append a streaming delta.
    ///
    /// Returns `false` without touching anything when the message is gone
    /// or no longer accepts deltas (late deltas after cancel or truncate).
    pub fn patch_content(&mut self, id: MessageId, delta: &str) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            tracing::debug!(message_id = %id, "Dropping delta for removed message");
            return false;
        };
        if !message.status.accepts_deltas() {
            tracing::debug!(message_id = %id, status = %message.status, "Dropping late delta");
            return false;
        }
        message.content.push_str(delta);
        self.version += 1;
        true
    }

    pub fn replace_content(
        &mut self,
        id: MessageId,
        content: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.get_mut(id)?.content = content.into();
        self.version += 1;
        Ok(())
    }

    pub fn set_timestamp(
        &mut self,
        id: MessageId,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.get_mut(id)?.timestamp = timestamp;
        self.version += 1;
        Ok(())
    }

    pub fn set_streaming(&mut self, id: MessageId, streaming: bool) -> Result<(), StoreError> {
        let message = self.get_mut(id)?;
        if message.is_streaming != streaming {
            message.is_streaming = streaming;
            self.version += 1;
        }
        Ok(())
    }

    /// Move `id` to `status` if the status machine allows it
    pub fn set_status(&mut self, id: MessageId, status: MessageStatus) -> Result<(), StoreError> {
        let message = self.get_mut(id)?;
        match transition(message.role, message.status, status) {
            Ok(next) => {
                message.status = next;
                self.version += 1;
                Ok(())
            }
            Err(source) => {
                tracing::warn!(message_id = %id, error = %source, "Rejected status transition");
                Err(StoreError::Transition { id, source })
            }
        }
    }

    /// Remove every message logically after `id`: later sequence numbers
    /// and every descendant of `id`. Returns the removed ids.
    pub fn truncate_after(&mut self, id: MessageId) -> Result<Vec<MessageId>, StoreError> {
        let cutoff = self.get(id).ok_or(StoreError::NotFound(id))?.sequence;
        let descendants = self.threads.descendants(id);

        let (kept, removed): (Vec<Message>, Vec<Message>) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(|m| m.sequence <= cutoff && !descendants.contains(&m.id));
        self.messages = kept;

        let removed: Vec<MessageId> = removed.into_iter().map(|m| m.id).collect();
        for gone in &removed {
            self.threads.remove(*gone);
        }
        if !removed.is_empty() {
            self.version += 1;
        }
        Ok(removed)
    }

    /// Replace the whole list, rebuilding the thread index
    pub fn restore(&mut self, messages: Vec<Message>) {
        self.threads = ThreadIndex::rebuild(&messages);
        for message in &messages {
            self.bump_counters(message.id, message.sequence);
        }
        self.messages = messages;
        self.version += 1;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.threads = ThreadIndex::new();
        self.version += 1;
    }

    fn get_mut(&mut self, id: MessageId) -> Result<&mut Message, StoreError> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    // Ids and sequences are never reused, even across restore and clear
    fn bump_counters(&mut self, id: MessageId, sequence: u64) {
        self.next_id = self.next_id.max(id.0 + 1);
        self.next_sequence = self.next_sequence.max(sequence + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn add_user(store: &mut MessageStore, content: &str, parent: Option<MessageId>) -> MessageId {
        let message = store.create(NewMessage::user(content, parent, "openai", "gpt-4"), now());
        let id = message.id;
        store.append(message).unwrap();
        id
    }

    fn add_assistant(store: &mut MessageStore, parent: MessageId) -> MessageId {
        let message = store.create(NewMessage::assistant(parent, "openai", "gpt-4"), now());
        let id = message.id;
        store.append(message).unwrap();
        id
    }

    #[test]
    fn test_create_assigns_increasing_ids_and_initial_status() {
        let mut store = MessageStore::new();
        let user = add_user(&mut store, "hi", None);
        let reply = add_assistant(&mut store, user);

        assert!(reply > user);
        assert_eq!(store.get(user).unwrap().status, MessageStatus::Sending);
        assert_eq!(store.get(reply).unwrap().status, MessageStatus::Preparing);
        assert_eq!(store.get(reply).unwrap().role, Role::Assistant);
        assert_eq!(store.threads().children(user), &[reply]);
    }

    #[test]
    fn test_append_rejects_duplicates_and_unknown_parents() {
        let mut store = MessageStore::new();
        let user = add_user(&mut store, "hi", None);

        let duplicate = store.get(user).unwrap().clone();
        assert_eq!(store.append(duplicate), Err(StoreError::DuplicateId(user)));

        let stray = NewMessage::user("x", Some(MessageId(42)), "openai", "gpt-4");
        let orphan = store.create(stray, now());
        let orphan_id = orphan.id;
        assert_eq!(
            store.append(orphan),
            Err(StoreError::UnknownParent { id: orphan_id, parent: MessageId(42) })
        );
    }

    #[test]
    fn test_patch_content_stops_at_terminal_status() {
        let mut store = MessageStore::new();
        let user = add_user(&mut store, "hi", None);
        let reply = add_assistant(&mut store, user);

        assert!(store.patch_content(reply, "Hel"));
        store.set_status(reply, MessageStatus::Responding).unwrap();
        assert!(store.patch_content(reply, "lo"));
        store.set_status(reply, MessageStatus::Cancelled).unwrap();

        let before = store.version();
        assert!(!store.patch_content(reply, " late"));
        assert!(!store.patch_content(MessageId(999), "gone"));
        assert_eq!(store.get(reply).unwrap().content, "Hello");
        assert_eq!(store.version(), before);
    }

    #[test]
    fn test_set_status_rejects_illegal_moves() {
        let mut store = MessageStore::new();
        let user = add_user(&mut store, "hi", None);

        let err = store.set_status(user, MessageStatus::Responded).unwrap_err();
        assert!(matches!(err, StoreError::Transition { id, .. } if id == user));
        assert_eq!(store.get(user).unwrap().status, MessageStatus::Sending);
    }

    #[test]
    fn test_truncate_removes_later_and_descendants() {
        let mut store = MessageStore::new();
        let first = add_user(&mut store, "one", None);
        let first_reply = add_assistant(&mut store, first);
        let second = add_user(&mut store, "two", Some(first_reply));
        let second_reply = add_assistant(&mut store, second);

        let removed = store.truncate_after(first_reply).unwrap();
        assert_eq!(removed, vec![second, second_reply]);
        assert_eq!(store.len(), 2);
        assert!(!store.contains(second));
        assert!(store.threads().children(first_reply).is_empty());
    }

    #[test]
    fn test_truncate_after_last_is_noop() {
        let mut store = MessageStore::new();
        let user = add_user(&mut store, "hi", None);
        let before = store.version();

        assert!(store.truncate_after(user).unwrap().is_empty());
        assert_eq!(store.version(), before);
        assert_eq!(store.truncate_after(MessageId(77)), Err(StoreError::NotFound(MessageId(77))));
    }

    #[test]
    fn test_build_context_skips_streaming_and_follows_branch() {
        let mut store = MessageStore::new();
        let root = add_user(&mut store, "root", None);
        let reply = add_assistant(&mut store, root);
        store.patch_content(reply, "answer");
        add_user(&mut store, "a", Some(reply));
        let branch_b = add_user(&mut store, "b", Some(reply));
        let streaming = add_assistant(&mut store, branch_b);
        store.set_streaming(streaming, true).unwrap();

        let context = store.build_context(branch_b);
        let contents: Vec<&str> = context.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["root", "answer", "b"]);

        assert_eq!(store.build_context(streaming).len(), 3);
    }

    #[test]
    fn test_restore_keeps_ids_fresh() {
        let mut store = MessageStore::new();
        let user = add_user(&mut store, "hi", None);
        let snapshot = store.messages().to_vec();
        add_assistant(&mut store, user);

        store.restore(snapshot);
        assert_eq!(store.len(), 1);
        let next = store.create(NewMessage::user("again", None, "openai", "gpt-4"), now());
        assert_eq!(next.id, MessageId(3));
        assert_eq!(next.sequence, 3);
    }

    #[test]
    fn test_latest_uses_sequence_not_position() {
        let mut store = MessageStore::new();
        let first = add_user(&mut store, "one", None);
        let second = add_user(&mut store, "two", None);
        let mut reordered = store.messages().to_vec();
        reordered.reverse();
        store.restore(reordered);

        assert_eq!(store.latest().map(|m| m.id), Some(second));
        assert_eq!(store.ordered().first().map(|m| m.id), Some(first));
    }
}
