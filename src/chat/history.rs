//! Undo/redo over whole-list snapshots

use super::message::Message;

/// Linear snapshot history with a cursor.
///
/// Taking a snapshot while the cursor is behind the tip discards the
/// redo tail. With a limit set, the oldest snapshots fall off first.
#[derive(Debug, Clone, Default)]
pub struct History {
    snapshots: Vec<Vec<Message>>,
    cursor: Option<usize>,
    limit: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` snapshots (minimum one)
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit.max(1)),
            ..Self::default()
        }
    }

    pub fn snapshot(&mut self, messages: &[Message]) {
        let keep = self.cursor.map_or(0, |cursor| cursor + 1);
        self.snapshots.truncate(keep);
        self.snapshots.push(messages.to_vec());

        if let Some(limit) = self.limit {
            let overflow = self.snapshots.len().saturating_sub(limit);
            self.snapshots.drain(..overflow);
        }
        self.cursor = Some(self.snapshots.len() - 1);
    }

    /// Step back one snapshot; `None` at the oldest one
    pub fn undo(&mut self) -> Option<Vec<Message>> {
        let cursor = self.cursor.filter(|c| *c > 0)? - 1;
        self.cursor = Some(cursor);
        self.snapshots.get(cursor).cloned()
    }

    /// Step forward one snapshot; `None` at the tip
    pub fn redo(&mut self) -> Option<Vec<Message>> {
        let cursor = self.cursor.filter(|c| c + 1 < self.snapshots.len())? + 1;
        self.cursor = Some(cursor);
        self.snapshots.get(cursor).cloned()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.snapshots.len())
    }

    /// Cursor position, `None` when empty
    pub fn position(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = None;
    }
}
