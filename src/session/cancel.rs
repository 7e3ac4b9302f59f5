//! Cancellation slot for the in-flight request

use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Why the in-flight request was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Explicit user cancel; the reply gets the cancellation marker
    User,
    /// An edit superseded the request; no marker
    Edit,
}

/// One in-flight request. Shared between the slot and the streaming loop
/// so the loop can read the reason after the slot has been cleared.
#[derive(Debug)]
struct ActiveRequest {
    token: CancellationToken,
    reason: Mutex<Option<CancelReason>>,
}

impl ActiveRequest {
    fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// First cancellation wins
    fn reason(&self) -> Option<CancelReason> {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel(&self, reason: CancelReason) {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(reason);
        self.token.cancel();
    }
}

/// Claim on the token slot for one request.
///
/// Dropping the guard without [`finish`](Self::finish) (the send future
/// was dropped mid-flight) cancels the token and frees the slot.
#[derive(Debug)]
pub(crate) struct RequestGuard {
    handle: CancelHandle,
    request: Arc<ActiveRequest>,
}

impl RequestGuard {
    pub(crate) fn token(&self) -> &CancellationToken {
        self.request.token()
    }

    pub(crate) fn reason(&self) -> Option<CancelReason> {
        self.request.reason()
    }

    /// Free the slot once the request has ended
    pub(crate) fn finish(&self) {
        self.handle.release(&self.request);
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if self.handle.release(&self.request) {
            tracing::debug!("Request abandoned before it finished");
            self.request.token.cancel();
        }
    }
}

/// Cloneable handle on the session's token slot.
///
/// At most one request is active; cancelling signals its token and clears
/// the slot. The streaming loop notices the token and settles the reply.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    slot: Arc<Mutex<Option<Arc<ActiveRequest>>>>,
}

impl CancelHandle {
    /// Cancel the active request, if any. Returns whether one was active.
    pub fn cancel(&self) -> bool {
        self.cancel_with(CancelReason::User)
    }

    /// Cancel because an edit supersedes the request
    pub fn cancel_for_edit(&self) -> bool {
        self.cancel_with(CancelReason::Edit)
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    fn cancel_with(&self, reason: CancelReason) -> bool {
        match self.lock().take() {
            Some(request) => {
                tracing::debug!(?reason, "Cancelling in-flight request");
                request.cancel(reason);
                true
            }
            None => false,
        }
    }

    /// Claim the slot for a new request; `None` if one is already active
    pub(crate) fn begin(&self) -> Option<RequestGuard> {
        let mut slot = self.lock();
        if slot.is_some() {
            return None;
        }
        let request = Arc::new(ActiveRequest {
            token: CancellationToken::new(),
            reason: Mutex::new(None),
        });
        *slot = Some(Arc::clone(&request));
        Some(RequestGuard {
            handle: self.clone(),
            request,
        })
    }

    /// Release the slot if it still holds `request`; returns whether it did
    fn release(&self, request: &Arc<ActiveRequest>) -> bool {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|active| Arc::ptr_eq(active, request)) {
            *slot = None;
            true
        } else {
            false
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<ActiveRequest>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
