//! Send, edit and the streaming exchange behind both

use super::cancel::{CancelReason, RequestGuard};
use super::{Session, SessionEvent};
use crate::chat::{Message, MessageId, MessageStatus, NewMessage, Role};
use crate::decoder::SseDecoder;
use crate::error::{SessionError, FAILURE_TEXT};
use crate::provider::ProviderAdapter;
use crate::settings::ProviderSettings;
use crate::transport::TransportError;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Appended to a reply the user cancelled
pub const CANCELLED_MARKER: &str = "[Response cancelled]";

/// Everything needed to reach the selected model
struct Route {
    model_id: String,
    provider_id: String,
    adapter: Arc<dyn ProviderAdapter>,
    settings: ProviderSettings,
}

enum StreamOutcome {
    Completed,
    Cancelled,
    Failed(TransportError),
}

fn non_blank(content: &str) -> Result<&str, SessionError> {
    let content = content.trim();
    if content.is_empty() {
        Err(SessionError::BlankContent)
    } else {
        Ok(content)
    }
}

impl Session {
    /// Send a user message under `parent_id` (a new root when `None`) and
    /// stream the reply, calling `on_delta` for every applied delta.
    ///
    /// Returns the finished assistant message. A cancelled or failed reply
    /// stays in the store and is reported through the error.
    pub async fn send_message<F>(
        &mut self,
        content: &str,
        parent_id: Option<MessageId>,
        mut on_delta: F,
    ) -> Result<Message, SessionError>
    where
        F: FnMut(&str),
    {
        let content = non_blank(content)?;
        let route = self.route()?;
        if let Some(parent) = parent_id {
            if !self.store.contains(parent) {
                return Err(SessionError::MessageNotFound(parent));
            }
        }
        let request = self.begin_request()?;
        self.checkpoint();

        let user = self.store.create(
            NewMessage::user(content, parent_id, &route.provider_id, &route.model_id),
            self.clock.now(),
        );
        let user_id = user.id;
        if let Err(e) = self.store.append(user) {
            request.finish();
            return Err(e.into());
        }
        self.emit_added(user_id);

        self.run_exchange(&route, user_id, request, &mut on_delta).await
    }

    /// Continue under the latest message
    pub async fn reply<F>(&mut self, content: &str, on_delta: F) -> Result<Message, SessionError>
    where
        F: FnMut(&str),
    {
        let parent = self.store.latest().map(|m| m.id);
        self.send_message(content, parent, on_delta).await
    }

    /// Replace a user message's content and regenerate its reply.
    ///
    /// Everything after the message is discarded first, so the new reply
    /// becomes the only branch below it.
    pub async fn save_edit<F>(
        &mut self,
        message_id: MessageId,
        new_content: &str,
        mut on_delta: F,
    ) -> Result<Message, SessionError>
    where
        F: FnMut(&str),
    {
        let content = non_blank(new_content)?;
        self.check_editable(message_id)?;
        let route = self.route()?;

        self.cancel.cancel_for_edit();
        self.settle_orphans(CancelReason::Edit);
        let request = self.begin_request()?;

        self.checkpoint();
        if let Err(e) = self.apply_edit(message_id, content) {
            request.finish();
            return Err(e);
        }
        self.run_exchange(&route, message_id, request, &mut on_delta).await
    }

    /// Open a sent user message for editing
    pub fn start_editing(&mut self, message_id: MessageId) -> Result<(), SessionError> {
        self.check_editable(message_id)?;
        self.cancel.cancel_for_edit();
        self.settle_orphans(CancelReason::Edit);
        let status = self.store.get(message_id).map(|m| m.status);

        if let Some(previous) = self.editing.take() {
            if previous != message_id {
                self.update_status(previous, MessageStatus::Sent);
            }
        }
        if status == Some(MessageStatus::Sent) {
            self.update_status(message_id, MessageStatus::Editing);
        }
        self.editing = Some(message_id);
        Ok(())
    }

    /// Close the editor without saving. Returns whether one was open.
    pub fn cancel_editing(&mut self) -> bool {
        match self.editing.take() {
            Some(id) => self.update_status(id, MessageStatus::Sent),
            None => false,
        }
    }

    // ========================================================================
    // Exchange
    // ========================================================================

    fn route(&self) -> Result<Route, SessionError> {
        let model_id = self.current_model.clone().ok_or(SessionError::NoModelSelected)?;
        let provider_id = self
            .catalog
            .provider_for(&model_id)
            .ok_or_else(|| SessionError::UnknownModel(model_id.clone()))?
            .to_string();
        let adapter = self
            .adapters
            .get(&provider_id)
            .ok_or_else(|| SessionError::UnknownProvider(provider_id.clone()))?;
        let settings = self.provider_settings(&provider_id);
        adapter.check(&model_id, &settings)?;

        Ok(Route {
            model_id,
            provider_id,
            adapter,
            settings,
        })
    }

    fn begin_request(&mut self) -> Result<RequestGuard, SessionError> {
        let request = self.cancel.begin().ok_or(SessionError::Busy)?;
        self.settle_orphans(CancelReason::User);
        Ok(request)
    }

    /// A `sending` user message only survives in a restored snapshot; it is
    /// settled to `sent` before the edit goes ahead
    fn check_editable(&self, message_id: MessageId) -> Result<MessageStatus, SessionError> {
        let message = self
            .store
            .get(message_id)
            .ok_or(SessionError::MessageNotFound(message_id))?;
        if message.role != Role::User {
            return Err(SessionError::NotAUserMessage(message_id));
        }
        match message.status {
            MessageStatus::Sending | MessageStatus::Sent | MessageStatus::Editing => {
                Ok(message.status)
            }
            status => Err(SessionError::NotEditable {
                id: message_id,
                status,
            }),
        }
    }

    fn apply_edit(&mut self, message_id: MessageId, content: &str) -> Result<(), SessionError> {
        let removed = self.store.truncate_after(message_id)?;
        if !removed.is_empty() {
            tracing::debug!(
                message_id = %message_id,
                removed = removed.len(),
                "Truncated for edit"
            );
            self.emit(SessionEvent::Truncated {
                version: self.store.version(),
                after: message_id,
                removed,
            });
        }

        self.store.replace_content(message_id, content)?;
        self.store.set_timestamp(message_id, self.clock.now())?;
        self.emit(SessionEvent::Edited {
            version: self.store.version(),
            id: message_id,
        });

        if self.editing == Some(message_id) {
            self.editing = None;
        }
        if self.store.get(message_id).is_some_and(|m| m.status == MessageStatus::Editing) {
            self.update_status(message_id, MessageStatus::Sent);
        }
        Ok(())
    }

    /// Placeholder, checkpoint, stream, settle, checkpoint
    async fn run_exchange<F>(
        &mut self,
        route: &Route,
        user_id: MessageId,
        request: RequestGuard,
        on_delta: &mut F,
    ) -> Result<Message, SessionError>
    where
        F: FnMut(&str),
    {
        let assistant = self.store.create(
            NewMessage::assistant(user_id, &route.provider_id, &route.model_id),
            self.clock.now(),
        );
        let assistant_id = assistant.id;
        if let Err(e) = self.store.append(assistant) {
            request.finish();
            return Err(e.into());
        }
        self.emit_added(assistant_id);
        self.checkpoint();

        if self.store.get(user_id).is_some_and(|m| m.status == MessageStatus::Sending) {
            self.update_status(user_id, MessageStatus::Sent);
        }

        tracing::info!(
            session_id = %self.id,
            message_id = %assistant_id,
            model = %route.model_id,
            provider = %route.provider_id,
            "Streaming reply"
        );
        let outcome = self
            .stream_reply(route, user_id, assistant_id, request.token(), on_delta)
            .await;
        request.finish();

        let result = self.settle(assistant_id, outcome, request.reason());
        self.checkpoint();
        result
    }

    async fn stream_reply<F>(
        &mut self,
        route: &Route,
        user_id: MessageId,
        assistant_id: MessageId,
        token: &CancellationToken,
        on_delta: &mut F,
    ) -> StreamOutcome
    where
        F: FnMut(&str),
    {
        let context = self.store.build_context(user_id);
        let built = route
            .adapter
            .build_request(&route.model_id, &context, &route.settings);
        let request = match built {
            Ok(request) => request,
            Err(e) => return StreamOutcome::Failed(TransportError::invalid_request(e.to_string())),
        };

        let transport = Arc::clone(&self.transport);
        let opened = tokio::select! {
            biased;
            () = token.cancelled() => return StreamOutcome::Cancelled,
            opened = transport.open_stream(request, token.clone()) => opened,
        };
        let mut body = match opened {
            Ok(body) => body,
            Err(e) if e.is_cancelled() => return StreamOutcome::Cancelled,
            Err(e) => return StreamOutcome::Failed(e),
        };

        self.update_status(assistant_id, MessageStatus::Responding);
        self.set_streaming(assistant_id, true);
        let mut decoder = SseDecoder::new(Arc::clone(&route.adapter));

        loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => return StreamOutcome::Cancelled,
                next = body.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    for delta in decoder.feed(&chunk) {
                        // on_delta may have cancelled
                        if token.is_cancelled() {
                            return StreamOutcome::Cancelled;
                        }
                        self.apply_delta(assistant_id, &delta, on_delta);
                    }
                    if decoder.is_done() {
                        break;
                    }
                }
                Some(Err(e)) if e.is_cancelled() => return StreamOutcome::Cancelled,
                Some(Err(e)) => return StreamOutcome::Failed(e),
                None => break,
            }
        }
        if token.is_cancelled() {
            return StreamOutcome::Cancelled;
        }

        for delta in decoder.finish() {
            self.apply_delta(assistant_id, &delta, on_delta);
        }
        StreamOutcome::Completed
    }

    fn settle(
        &mut self,
        assistant_id: MessageId,
        outcome: StreamOutcome,
        reason: Option<CancelReason>,
    ) -> Result<Message, SessionError> {
        self.set_streaming(assistant_id, false);

        match outcome {
            StreamOutcome::Completed => {
                self.update_status(assistant_id, MessageStatus::Responded);
                let message = self
                    .store
                    .get(assistant_id)
                    .cloned()
                    .ok_or(SessionError::MessageNotFound(assistant_id))?;
                tracing::info!(
                    session_id = %self.id,
                    message_id = %assistant_id,
                    chars = message.content.chars().count(),
                    "Reply completed"
                );
                Ok(message)
            }
            StreamOutcome::Cancelled => {
                self.mark_cancelled(assistant_id, reason.unwrap_or(CancelReason::User));
                Err(SessionError::Cancelled {
                    message_id: assistant_id,
                })
            }
            StreamOutcome::Failed(source) => {
                tracing::error!(
                    session_id = %self.id,
                    message_id = %assistant_id,
                    error = %source.message,
                    kind = ?source.kind,
                    "Reply failed"
                );
                if self.store.replace_content(assistant_id, FAILURE_TEXT).is_ok() {
                    self.emit(SessionEvent::Edited {
                        version: self.store.version(),
                        id: assistant_id,
                    });
                }
                self.update_status(assistant_id, MessageStatus::Cancelled);
                Err(SessionError::Transport {
                    message_id: assistant_id,
                    source,
                })
            }
        }
    }

    /// Cancel a reply, appending the marker unless an edit superseded it
    fn mark_cancelled(&mut self, id: MessageId, reason: CancelReason) {
        if reason == CancelReason::User {
            let marker = match self.store.get(id) {
                Some(m) if m.content.is_empty() => CANCELLED_MARKER.to_string(),
                Some(_) => format!("\n\n{CANCELLED_MARKER}"),
                None => return,
            };
            self.apply_delta(id, &marker, &mut |_: &str| {});
        }
        self.set_streaming(id, false);
        self.update_status(id, MessageStatus::Cancelled);
        tracing::info!(session_id = %self.id, message_id = %id, ?reason, "Reply cancelled");
    }

    /// Settle messages left mid-exchange with no request behind them
    /// (restored from history): replies still waiting for deltas are
    /// cancelled and user messages still `sending` become `sent`.
    ///
    /// Returns the number of replies cancelled.
    pub(super) fn settle_orphans(&mut self, reason: CancelReason) -> usize {
        let mut replies = Vec::new();
        let mut senders = Vec::new();
        for message in self.store.messages() {
            match (message.role, message.status) {
                (Role::Assistant, status) if status.accepts_deltas() => replies.push(message.id),
                (Role::User, MessageStatus::Sending) => senders.push(message.id),
                _ => {}
            }
        }
        for id in &replies {
            self.mark_cancelled(*id, reason);
        }
        for id in senders {
            self.update_status(id, MessageStatus::Sent);
        }
        replies.len()
    }

    // ========================================================================
    // Store + event helpers
    // ========================================================================

    fn apply_delta<F>(&mut self, id: MessageId, delta: &str, on_delta: &mut F)
    where
        F: FnMut(&str),
    {
        if self.store.patch_content(id, delta) {
            on_delta(delta);
            self.emit(SessionEvent::ContentDelta {
                version: self.store.version(),
                id,
                delta: delta.to_string(),
            });
        }
    }

    fn emit_added(&self, id: MessageId) {
        self.emit(SessionEvent::MessageAdded {
            version: self.store.version(),
            id,
        });
    }

    /// Apply a status change; rejections are logged by the store
    fn update_status(&mut self, id: MessageId, status: MessageStatus) -> bool {
        if self.store.set_status(id, status).is_err() {
            return false;
        }
        self.emit(SessionEvent::StatusChanged {
            version: self.store.version(),
            id,
            status,
        });
        true
    }

    fn set_streaming(&mut self, id: MessageId, streaming: bool) {
        if let Err(e) = self.store.set_streaming(id, streaming) {
            tracing::debug!(message_id = %id, error = %e, "Streaming flag not updated");
        }
    }
}
