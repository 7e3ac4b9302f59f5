//! Thread index
//!
//! Parent/child relations over the message forest. The index only holds
//! ids; message bodies live in the store.

use super::message::{ContextMessage, Message, MessageId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use thiserror::Error;

/// Why an ancestor walk stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainBreak {
    /// Parent id that no indexed message carries
    MissingParent,
    /// Parent already visited on this walk
    Cycle,
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainBreak::MissingParent => f.write_str("missing parent"),
            ChainBreak::Cycle => f.write_str("cycle"),
        }
    }
}

/// Ancestor walk that could not reach a root.
///
/// `partial` holds the ancestors found before the break, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ancestor chain broken at {at}: {reason}")]
pub struct BrokenChain {
    pub at: MessageId,
    pub reason: ChainBreak,
    pub partial: Vec<MessageId>,
}

/// Parent and child lookups for every stored message
#[derive(Debug, Clone, Default)]
pub struct ThreadIndex {
    parents: HashMap<MessageId, Option<MessageId>>,
    children: HashMap<MessageId, Vec<MessageId>>,
    roots: Vec<MessageId>,
}

impl ThreadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from scratch, in sequence order so child lists come out
    /// chronological.
    pub fn rebuild(messages: &[Message]) -> Self {
        let mut ordered: Vec<&Message> = messages.iter().collect();
        ordered.sort_by_key(|m| m.sequence);

        let mut index = Self::new();
        for message in ordered {
            index.insert(message.id, message.parent_id);
        }
        index
    }

    /// Register `id` under `parent`, or as a root.
    ///
    /// The parent does not need to be indexed; a dangling link surfaces
    /// later as a [`BrokenChain`].
    pub fn insert(&mut self, id: MessageId, parent: Option<MessageId>) {
        if self.parents.contains_key(&id) {
            // Re-insert: drop the stale link first
            self.unlink(id);
        }
        self.parents.insert(id, parent);
        match parent {
            Some(parent) => self.children.entry(parent).or_default().push(id),
            None => self.roots.push(id),
        }
    }

    /// Forget `id`. Its own children keep their (now dangling) parent link.
    pub fn remove(&mut self, id: MessageId) {
        self.unlink(id);
        self.parents.remove(&id);
        self.children.remove(&id);
    }

    fn unlink(&mut self, id: MessageId) {
        match self.parents.get(&id).copied().flatten() {
            Some(parent) => {
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.retain(|child| *child != id);
                    if siblings.is_empty() {
                        self.children.remove(&parent);
                    }
                }
            }
            None => self.roots.retain(|root| *root != id),
        }
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.parents.contains_key(&id)
    }

    /// Parent of `id`; `None` if `id` is not indexed
    pub fn parent(&self, id: MessageId) -> Option<Option<MessageId>> {
        self.parents.get(&id).copied()
    }

    pub fn children(&self, id: MessageId) -> &[MessageId] {
        self.children.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn roots(&self) -> &[MessageId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Every message below `id`, breadth first
    pub fn descendants(&self, id: MessageId) -> Vec<MessageId> {
        let mut found = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut queue: VecDeque<MessageId> = self.children(id).iter().copied().collect();

        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            found.push(next);
            queue.extend(self.children(next).iter().copied());
        }
        found
    }

    /// Ancestors of `id`, oldest first, excluding `id` itself.
    ///
    /// Terminates on cycles and missing parents; both are reported as a
    /// [`BrokenChain`] carrying what was found before the break.
    pub fn ancestor_chain(&self, id: MessageId) -> Result<Vec<MessageId>, BrokenChain> {
        let Some(mut cursor) = self.parent(id) else {
            return Err(BrokenChain {
                at: id,
                reason: ChainBreak::MissingParent,
                partial: Vec::new(),
            });
        };

        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);

        while let Some(parent) = cursor {
            if !seen.insert(parent) {
                chain.reverse();
                return Err(BrokenChain {
                    at: parent,
                    reason: ChainBreak::Cycle,
                    partial: chain,
                });
            }
            let Some(next) = self.parent(parent) else {
                chain.reverse();
                return Err(BrokenChain {
                    at: parent,
                    reason: ChainBreak::MissingParent,
                    partial: chain,
                });
            };
            chain.push(parent);
            cursor = next;
        }

        chain.reverse();
        Ok(chain)
    }

    /// Provider context for `id`: its ancestors plus itself, minus anything
    /// still streaming, in sequence order.
    ///
    /// A broken chain degrades to the partial chain with a warning.
    pub fn build_context<'a, F>(&self, id: MessageId, lookup: F) -> Vec<ContextMessage>
    where
        F: Fn(MessageId) -> Option<&'a Message>,
    {
        let mut ids = self.ancestor_chain(id).unwrap_or_else(|broken| {
            tracing::warn!(
                message_id = %id,
                at = %broken.at,
                reason = %broken.reason,
                kept = broken.partial.len(),
                "Building context from a broken thread"
            );
            broken.partial
        });
        ids.push(id);

        let mut messages: Vec<&Message> = ids
            .into_iter()
            .filter_map(lookup)
            .filter(|m| !m.is_streaming)
            .collect();
        messages.sort_by_key(|m| m.sequence);
        messages.into_iter().map(Message::to_context).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> MessageId {
        MessageId(n)
    }

    fn linear(len: u64) -> ThreadIndex {
        let mut index = ThreadIndex::new();
        index.insert(id(1), None);
        for n in 2..=len {
            index.insert(id(n), Some(id(n - 1)));
        }
        index
    }

    #[test]
    fn test_chain_is_oldest_first_and_excludes_self() {
        let index = linear(4);
        assert_eq!(index.ancestor_chain(id(4)).unwrap(), vec![id(1), id(2), id(3)]);
        assert_eq!(index.ancestor_chain(id(1)).unwrap(), Vec::<MessageId>::new());
    }

    #[test]
    fn test_missing_parent_reports_partial_chain() {
        let mut index = ThreadIndex::new();
        index.insert(id(2), Some(id(99)));
        index.insert(id(3), Some(id(2)));

        let broken = index.ancestor_chain(id(3)).unwrap_err();
        assert_eq!(broken.at, id(99));
        assert_eq!(broken.reason, ChainBreak::MissingParent);
        assert_eq!(broken.partial, vec![id(2)]);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut index = ThreadIndex::new();
        index.insert(id(1), Some(id(3)));
        index.insert(id(2), Some(id(1)));
        index.insert(id(3), Some(id(2)));

        let broken = index.ancestor_chain(id(3)).unwrap_err();
        assert_eq!(broken.reason, ChainBreak::Cycle);
        assert_eq!(broken.partial, vec![id(1), id(2)]);
    }

    #[test]
    fn test_remove_leaves_children_dangling() {
        let mut index = linear(3);
        index.remove(id(2));

        assert!(!index.contains(id(2)));
        assert!(index.children(id(1)).is_empty());
        assert_eq!(index.parent(id(3)), Some(Some(id(2))));
        assert!(index.ancestor_chain(id(3)).is_err());
    }

    #[test]
    fn test_descendants_cover_branches() {
        let mut index = linear(3);
        index.insert(id(4), Some(id(1)));
        index.insert(id(5), Some(id(4)));

        let mut below = index.descendants(id(1));
        below.sort();
        assert_eq!(below, vec![id(2), id(3), id(4), id(5)]);
        assert!(index.descendants(id(5)).is_empty());
    }

    #[test]
    fn test_multiple_roots() {
        let mut index = ThreadIndex::new();
        index.insert(id(1), None);
        index.insert(id(2), Some(id(1)));
        index.insert(id(3), None);
        assert_eq!(index.roots(), &[id(1), id(3)]);

        index.remove(id(1));
        assert_eq!(index.roots(), &[id(3)]);
    }

    #[test]
    fn test_reinsert_moves_child() {
        let mut index = linear(2);
        index.insert(id(3), Some(id(1)));
        index.insert(id(3), Some(id(2)));

        assert_eq!(index.children(id(1)), &[id(2)]);
        assert_eq!(index.children(id(2)), &[id(3)]);
    }
}
