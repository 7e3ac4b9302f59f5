//! Message status machine
//!
//! User messages: `sending -> sent | cancelled`, `sent -> editing -> sent`.
//! Assistant messages: `preparing -> responding -> responded`, and
//! `preparing | responding -> cancelled`.

use super::message::Role;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// User message created, request not yet issued
    Sending,
    /// User message accepted
    Sent,
    /// User message open in the editor
    Editing,
    /// Assistant placeholder waiting for the stream to open
    Preparing,
    /// Assistant message receiving deltas
    Responding,
    /// Assistant message complete
    Responded,
    /// Cancelled or failed
    Cancelled,
}

impl MessageStatus {
    /// Status a freshly created message starts in
    pub fn initial(role: Role) -> Self {
        match role {
            Role::User => MessageStatus::Sending,
            Role::Assistant => MessageStatus::Preparing,
        }
    }

    /// No transition may leave a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Responded | MessageStatus::Cancelled)
    }

    /// Whether content deltas may still be applied
    pub fn accepts_deltas(self) -> bool {
        matches!(self, MessageStatus::Preparing | MessageStatus::Responding)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Editing => "editing",
            MessageStatus::Preparing => "preparing",
            MessageStatus::Responding => "responding",
            MessageStatus::Responded => "responded",
            MessageStatus::Cancelled => "cancelled",
        }
    }

    /// Every status, for exhaustive checks
    pub const ALL: [MessageStatus; 7] = [
        MessageStatus::Sending,
        MessageStatus::Sent,
        MessageStatus::Editing,
        MessageStatus::Preparing,
        MessageStatus::Responding,
        MessageStatus::Responded,
        MessageStatus::Cancelled,
    ];
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{role} message is already {from} (terminal), cannot move to {to}")]
    Terminal {
        role: Role,
        from: MessageStatus,
        to: MessageStatus,
    },
    #[error("invalid {role} message transition: {from} -> {to}")]
    Invalid {
        role: Role,
        from: MessageStatus,
        to: MessageStatus,
    },
}

/// Pure transition check
///
/// Returns the new status when `from -> to` is legal for `role`.
pub fn transition(
    role: Role,
    from: MessageStatus,
    to: MessageStatus,
) -> Result<MessageStatus, TransitionError> {
    use MessageStatus::{Cancelled, Editing, Preparing, Responded, Responding, Sending, Sent};

    match (role, from, to) {
        (Role::User, Sending, Sent | Cancelled)
        | (Role::User, Sent, Editing)
        | (Role::User, Editing, Sent)
        | (Role::Assistant, Preparing, Responding | Cancelled)
        | (Role::Assistant, Responding, Responded | Cancelled) => Ok(to),

        (_, Responded | Cancelled, _) => Err(TransitionError::Terminal { role, from, to }),

        _ => Err(TransitionError::Invalid { role, from, to }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_happy_path() {
        let sent = transition(Role::User, MessageStatus::Sending, MessageStatus::Sent).unwrap();
        let editing = transition(Role::User, sent, MessageStatus::Editing).unwrap();
        assert_eq!(
            transition(Role::User, editing, MessageStatus::Sent),
            Ok(MessageStatus::Sent)
        );
    }

    #[test]
    fn test_assistant_happy_path() {
        let responding =
            transition(Role::Assistant, MessageStatus::Preparing, MessageStatus::Responding)
                .unwrap();
        assert_eq!(
            transition(Role::Assistant, responding, MessageStatus::Responded),
            Ok(MessageStatus::Responded)
        );
    }

    #[test]
    fn test_cancelled_is_final() {
        for to in MessageStatus::ALL {
            for role in [Role::User, Role::Assistant] {
                assert!(matches!(
                    transition(role, MessageStatus::Cancelled, to),
                    Err(TransitionError::Terminal { .. })
                ));
            }
        }
    }

    #[test]
    fn test_no_resurrection_into_preparing() {
        use MessageStatus::{Preparing, Responded, Responding, Sending, Sent};
        assert!(transition(Role::Assistant, Responded, Preparing).is_err());
        assert!(transition(Role::Assistant, Responding, Preparing).is_err());
        assert!(transition(Role::User, Sent, Sending).is_err());
    }

    #[test]
    fn test_roles_do_not_share_statuses() {
        use MessageStatus::{Editing, Preparing, Responded, Responding, Sending, Sent};
        assert!(transition(Role::User, Preparing, Responding).is_err());
        assert!(transition(Role::Assistant, Sending, Sent).is_err());
        assert!(transition(Role::Assistant, Responded, Editing).is_err());
    }

    #[test]
    fn test_sent_only_leaves_for_editing() {
        for to in MessageStatus::ALL {
            let result = transition(Role::User, MessageStatus::Sent, to);
            assert_eq!(result.is_ok(), to == MessageStatus::Editing, "sent -> {to}");
        }
    }
}
