//! Chat session
//!
//! A [`Session`] owns the message store, the undo history and the model
//! selection, and drives one streamed exchange at a time against the
//! injected transport. Every mutation is followed by a [`SessionEvent`]
//! on a broadcast channel.

mod cancel;
mod events;
mod exchange;


pub use cancel::{CancelHandle, CancelReason};
pub use events::SessionEvent;
pub use exchange::CANCELLED_MARKER;

use crate::catalog::{CatalogResponse, ModelCatalog, ModelInfo, ModelKind};
use crate::chat::{ContextMessage, History, Message, MessageId, MessageStatus, MessageStore};
use crate::clock::{Clock, SystemClock};
use crate::error::SessionError;
use crate::images::{build_image_request, unwrap_image_response, ImageError, ImageRequest};
use crate::provider::AdapterRegistry;
use crate::settings::{EngineConfig, ProviderSettings, Settings, SettingsStore};
use crate::transport::ChatTransport;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Sent by [`Session::test_provider_connection`]
pub const CONNECTION_TEST_MESSAGE: &str = "Hello, this is a test message.";

const EVENT_CAPACITY: usize = 128;

// ============================================================================
// Builder
// ============================================================================

pub struct SessionBuilder {
    transport: Arc<dyn ChatTransport>,
    settings_store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    adapters: AdapterRegistry,
    catalog: ModelCatalog,
    config: EngineConfig,
}

impl SessionBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Load settings and pick the default model
    pub fn build(self) -> Result<Session, SessionError> {
        let settings = self.settings_store.load()?;
        let history = match self.config.history_limit {
            Some(limit) => History::with_limit(limit),
            None => History::new(),
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut session = Session {
            id: Uuid::new_v4(),
            store: MessageStore::new(),
            history,
            adapters: self.adapters,
            catalog: self.catalog,
            transport: self.transport,
            settings_store: self.settings_store,
            settings,
            config: self.config,
            clock: self.clock,
            current_model: None,
            editing: None,
            cancel: CancelHandle::default(),
            events,
        };

        if let Some(model_id) = session.effective_settings().default_model {
            let usable = session.lookup_model(&model_id, ModelKind::Text).map(|_| ());
            match usable {
                Ok(()) => session.current_model = Some(model_id),
                Err(e) => tracing::warn!(error = %e, "Default model unusable, leaving unselected"),
            }
        }

        tracing::info!(
            session_id = %session.id,
            model = ?session.current_model,
            "Session started"
        );
        Ok(session)
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct Session {
    id: Uuid,
    store: MessageStore,
    history: History,
    adapters: AdapterRegistry,
    catalog: ModelCatalog,
    transport: Arc<dyn ChatTransport>,
    settings_store: Arc<dyn SettingsStore>,
    /// Persisted settings, without the environment overlay
    settings: Settings,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    current_model: Option<String>,
    editing: Option<MessageId>,
    cancel: CancelHandle,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn builder(
        transport: Arc<dyn ChatTransport>,
        settings_store: Arc<dyn SettingsStore>,
    ) -> SessionBuilder {
        SessionBuilder {
            transport,
            settings_store,
            clock: Arc::new(SystemClock),
            adapters: AdapterRegistry::with_defaults(),
            catalog: ModelCatalog::builtin(),
            config: EngineConfig::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Messages in storage order
    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.store.get(id)
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// User message currently open in the editor
    pub fn editing(&self) -> Option<MessageId> {
        self.editing
    }

    pub fn is_busy(&self) -> bool {
        self.cancel.is_active()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Handle for cancelling from another task while a send is awaited
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Cancel the in-flight request. Idempotent.
    ///
    /// Also settles a reply left mid-stream by an undo or redo, since no
    /// request can be feeding it any more.
    pub fn cancel_current_request(&mut self) -> bool {
        let signalled = self.cancel.cancel();
        let settled = self.settle_orphans(CancelReason::User);
        signalled || settled > 0
    }

    // ========================================================================
    // History
    // ========================================================================

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(messages) => {
                self.restore(messages);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(messages) => {
                self.restore(messages);
                true
            }
            None => false,
        }
    }

    /// Drop every message and all history
    pub fn clear_messages(&mut self) {
        self.cancel.cancel();
        self.store.clear();
        self.history.clear();
        self.editing = None;
        tracing::info!(session_id = %self.id, "Messages cleared");
        self.emit(SessionEvent::HistoryRestored {
            version: self.store.version(),
        });
    }

    fn restore(&mut self, messages: Vec<Message>) {
        self.store.restore(messages);
        let editing = self.editing.filter(|id| {
            self.store
                .get(*id)
                .is_some_and(|m| m.status == MessageStatus::Editing)
        });
        self.editing = editing;
        tracing::debug!(
            session_id = %self.id,
            position = ?self.history.position(),
            messages = self.store.len(),
            "History restored"
        );
        self.emit(SessionEvent::HistoryRestored {
            version: self.store.version(),
        });
    }

    fn checkpoint(&mut self) {
        self.history.snapshot(self.store.messages());
    }

    // ========================================================================
    // Models
    // ========================================================================

    /// Select a text model for subsequent sends
    pub fn set_current_model(&mut self, model_id: &str) -> Result<(), SessionError> {
        let provider_id = self
            .lookup_model(model_id, ModelKind::Text)?
            .provider_id
            .clone();
        self.current_model = Some(model_id.to_string());

        tracing::info!(model = %model_id, provider = %provider_id, "Model selected");
        self.emit(SessionEvent::ModelChanged {
            model_id: model_id.to_string(),
            provider_id,
        });
        Ok(())
    }

    pub fn current_model(&self) -> Option<&str> {
        self.current_model.as_deref()
    }

    pub fn current_provider(&self) -> Option<&str> {
        self.current_model
            .as_deref()
            .and_then(|model| self.catalog.provider_for(model))
    }

    pub fn model_name<'a>(&'a self, model_id: &'a str) -> &'a str {
        self.catalog.name_for(model_id)
    }

    pub fn model_provider(&self, model_id: &str) -> Option<&str> {
        self.catalog.provider_for(model_id)
    }

    fn lookup_model(&self, model_id: &str, kind: ModelKind) -> Result<&ModelInfo, SessionError> {
        let model = self
            .catalog
            .get(model_id)
            .ok_or_else(|| SessionError::UnknownModel(model_id.to_string()))?;
        if model.kind != kind {
            return Err(SessionError::WrongModelKind {
                model_id: model_id.to_string(),
                expected: kind,
            });
        }
        Ok(model)
    }

    /// Merge models reported by a catalog service
    pub fn merge_catalog(&mut self, response: CatalogResponse) {
        self.catalog.merge(ModelCatalog::from_response(response));
        tracing::debug!(models = self.catalog.models().len(), "Catalog updated");
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub fn save_default_model(&mut self, model_id: &str) -> Result<(), SessionError> {
        self.lookup_model(model_id, ModelKind::Text)?;
        self.settings.default_model = Some(model_id.to_string());
        self.persist()
    }

    pub fn save_default_image_model(&mut self, model_id: &str) -> Result<(), SessionError> {
        self.lookup_model(model_id, ModelKind::Image)?;
        self.settings.default_image_model = Some(model_id.to_string());
        self.persist()
    }

    pub fn save_provider_settings(
        &mut self,
        provider_id: &str,
        settings: ProviderSettings,
    ) -> Result<(), SessionError> {
        self.settings.providers.insert(provider_id.to_string(), settings);
        self.persist()
    }

    fn persist(&self) -> Result<(), SessionError> {
        self.settings_store.save(&self.settings)?;
        tracing::info!(session_id = %self.id, "Settings saved");
        Ok(())
    }

    /// Stored settings with the environment overlay applied
    fn effective_settings(&self) -> Settings {
        let mut settings = self.settings.clone();
        self.config.apply_to(&mut settings);
        settings
    }

    fn provider_settings(&self, provider_id: &str) -> ProviderSettings {
        self.effective_settings().provider_or_default(provider_id)
    }

    // ========================================================================
    // Side requests
    // ========================================================================

    /// Send a fixed message through the provider's first enabled model.
    ///
    /// Never touches the message store.
    pub async fn test_provider_connection(&self, provider_id: &str) -> bool {
        let Some(adapter) = self.adapters.get(provider_id) else {
            tracing::warn!(provider = %provider_id, "Connection test for unknown provider");
            return false;
        };
        let settings = self.provider_settings(provider_id);
        let Some(model_id) = settings.first_enabled_model() else {
            tracing::warn!(provider = %provider_id, "Connection test without an enabled model");
            return false;
        };

        let greeting = [ContextMessage::user(CONNECTION_TEST_MESSAGE)];
        let request = match adapter.build_request(model_id, &greeting, &settings) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(provider = %provider_id, error = %e, "Connection test not possible");
                return false;
            }
        };

        let mut body = match self.transport.open_stream(request, CancellationToken::new()).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    provider = %provider_id,
                    error = %e.message,
                    "Connection test failed"
                );
                return false;
            }
        };
        while let Some(chunk) = body.next().await {
            if let Err(e) = chunk {
                tracing::warn!(
                    provider = %provider_id,
                    error = %e.message,
                    "Connection test failed mid-stream"
                );
                return false;
            }
        }

        tracing::info!(provider = %provider_id, model = %model_id, "Connection test passed");
        true
    }

    /// Generate images; returns URLs or data URLs
    pub async fn generate_image(
        &self,
        request: &ImageRequest,
    ) -> Result<Vec<String>, SessionError> {
        let settings = self.provider_settings(&request.provider);
        let http = build_image_request(request, &settings)?;
        let response = self
            .transport
            .post_json(http)
            .await
            .map_err(ImageError::Transport)?;

        let images = unwrap_image_response(&request.provider, &response);
        tracing::info!(
            provider = %request.provider,
            model = %request.model,
            count = images.len(),
            "Images generated"
        );
        Ok(images)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
