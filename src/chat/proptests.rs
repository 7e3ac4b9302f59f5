//! Property-based tests for the conversation model

use super::*;
use chrono::{DateTime, Utc};
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Test Helpers
// ============================================================================

fn fixed_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// One store mutation; indices pick among current messages modulo length
#[derive(Debug, Clone)]
enum Op {
    AddUser { parent: Option<usize> },
    AddAssistant { parent: usize },
    Patch { target: usize, text: String },
    SetStatus { target: usize, status: MessageStatus },
    Truncate { target: usize },
}

fn pick(store: &MessageStore, index: usize) -> Option<MessageId> {
    let ordered = store.ordered();
    if ordered.is_empty() {
        None
    } else {
        Some(ordered[index % ordered.len()].id)
    }
}

fn apply(store: &mut MessageStore, op: &Op) {
    match op {
        Op::AddUser { parent } => {
            let parent = parent.and_then(|p| pick(store, p));
            let new = NewMessage::user("u", parent, "openai", "gpt-4");
            let message = store.create(new, fixed_time());
            store.append(message).unwrap();
        }
        Op::AddAssistant { parent } => {
            if let Some(parent) = pick(store, *parent) {
                let new = NewMessage::assistant(parent, "openai", "gpt-4");
                let message = store.create(new, fixed_time());
                store.append(message).unwrap();
            }
        }
        Op::Patch { target, text } => {
            if let Some(id) = pick(store, *target) {
                store.patch_content(id, text);
            }
        }
        Op::SetStatus { target, status } => {
            if let Some(id) = pick(store, *target) {
                let _ = store.set_status(id, *status);
            }
        }
        Op::Truncate { target } => {
            if let Some(id) = pick(store, *target) {
                store.truncate_after(id).unwrap();
            }
        }
    }
}

fn build(ops: &[Op]) -> MessageStore {
    let mut store = MessageStore::new();
    for op in ops {
        apply(&mut store, op);
    }
    store
}

fn assert_thread_integrity(store: &MessageStore) -> Result<(), TestCaseError> {
    let threads = store.threads();
    prop_assert_eq!(threads.len(), store.len());

    for message in store.messages() {
        match message.parent_id {
            Some(parent) => {
                let hits = threads.children(parent).iter().filter(|c| **c == message.id).count();
                prop_assert_eq!(
                    hits,
                    1,
                    "message {} listed {} times under {}",
                    message.id,
                    hits,
                    parent
                );
            }
            None => {
                let hits = threads.roots().iter().filter(|r| **r == message.id).count();
                prop_assert_eq!(hits, 1, "root {} listed {} times", message.id, hits);
            }
        }
    }
    Ok(())
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_status() -> impl Strategy<Value = MessageStatus> {
    proptest::sample::select(MessageStatus::ALL.to_vec())
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => proptest::option::of(0usize..32).prop_map(|parent| Op::AddUser { parent }),
        3 => (0usize..32).prop_map(|parent| Op::AddAssistant { parent }),
        2 => (0usize..32, "[a-z ]{0,6}").prop_map(|(target, text)| Op::Patch { target, text }),
        2 => (0usize..32, arb_status())
            .prop_map(|(target, status)| Op::SetStatus { target, status }),
        1 => (0usize..32).prop_map(|target| Op::Truncate { target }),
    ]
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(arb_op(), 0..40)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Every parented message appears exactly once among its parent's children
    #[test]
    fn prop_thread_index_matches_messages(ops in arb_ops()) {
        let store = build(&ops);
        assert_thread_integrity(&store)?;

        let rebuilt = ThreadIndex::rebuild(store.messages());
        prop_assert_eq!(rebuilt.len(), store.len());
        prop_assert_eq!(rebuilt.roots(), store.threads().roots());
    }

    // Nothing later than, or below, the truncation point survives
    #[test]
    fn prop_truncate_is_complete(ops in arb_ops(), target in 0usize..32) {
        let mut store = build(&ops);
        let Some(id) = pick(&store, target) else { return Ok(()); };
        let cutoff = store.get(id).unwrap().sequence;
        let below: HashSet<MessageId> = store.threads().descendants(id).into_iter().collect();

        let removed = store.truncate_after(id).unwrap();

        prop_assert!(store.contains(id));
        for message in store.messages() {
            prop_assert!(message.sequence <= cutoff, "{} outlived cutoff", message.id);
            prop_assert!(!below.contains(&message.id), "descendant {} survived", message.id);
        }
        for gone in removed {
            prop_assert!(store.get(gone).is_none());
        }
        assert_thread_integrity(&store)?;
    }

    // snapshot; mutate; snapshot; undo; redo walks both states exactly
    #[test]
    fn prop_undo_redo_round_trip(setup in arb_ops(), mutation in arb_ops()) {
        let mut store = build(&setup);
        let mut history = History::new();

        history.snapshot(store.messages());
        let before = store.messages().to_vec();
        for op in &mutation {
            apply(&mut store, op);
        }
        history.snapshot(store.messages());
        let after = store.messages().to_vec();

        prop_assert_eq!(history.undo(), Some(before));
        prop_assert_eq!(history.redo(), Some(after));
        prop_assert!(!history.can_redo());
    }

    // Once terminal, a message's status never changes again
    #[test]
    fn prop_terminal_status_is_final(
        steps in proptest::collection::vec(arb_status(), 1..20),
        assistant in any::<bool>(),
    ) {
        let mut store = MessageStore::new();
        let root = store.create(NewMessage::user("q", None, "openai", "gpt-4"), fixed_time());
        let root_id = root.id;
        store.append(root).unwrap();
        let target = if assistant {
            let new = NewMessage::assistant(root_id, "openai", "gpt-4");
            let reply = store.create(new, fixed_time());
            let id = reply.id;
            store.append(reply).unwrap();
            id
        } else {
            root_id
        };

        let mut terminal: Option<MessageStatus> = None;
        for status in steps {
            let _ = store.set_status(target, status);
            let current = store.get(target).unwrap().status;
            if let Some(settled) = terminal {
                prop_assert_eq!(current, settled);
            } else if current.is_terminal() {
                terminal = Some(current);
            }
        }
    }

    // Context is sequence-ordered and never includes streaming messages
    #[test]
    fn prop_context_excludes_streaming(
        ops in arb_ops(),
        target in 0usize..32,
        streaming in 0usize..32,
    ) {
        let mut store = build(&ops);
        let Some(id) = pick(&store, target) else { return Ok(()); };
        if let Some(flagged) = pick(&store, streaming) {
            store.set_streaming(flagged, true).unwrap();
        }

        let context = store.build_context(id);
        let chain = store.threads().ancestor_chain(id).unwrap();
        let expected: Vec<ContextMessage> = chain
            .into_iter()
            .chain(std::iter::once(id))
            .filter_map(|m| store.get(m))
            .filter(|m| !m.is_streaming)
            .map(Message::to_context)
            .collect();
        prop_assert_eq!(context, expected);
    }
}
