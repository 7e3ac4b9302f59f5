//! Settings and configuration
//!
//! [`Settings`] is the persisted, user-editable state: API keys, custom
//! endpoints, enabled models and default model choices. It lives behind
//! the [`SettingsStore`] collaborator. [`EngineConfig`] is read once from
//! the environment at startup and overlays the stored settings without
//! being written back.

use crate::provider;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Default streaming request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// Settings
// ============================================================================

/// Per-provider settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Endpoint override, used by providers without a fixed endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub enabled_models: BTreeMap<String, bool>,
    /// Extra request-body parameters per model (temperature etc.)
    #[serde(default)]
    pub model_params: BTreeMap<String, Map<String, Value>>,
}

impl ProviderSettings {
    /// API key, treating an empty string as absent
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().filter(|url| !url.trim().is_empty())
    }

    pub fn first_enabled_model(&self) -> Option<&str> {
        self.enabled_models
            .iter()
            .find(|(_, enabled)| **enabled)
            .map(|(model, _)| model.as_str())
    }

    pub fn params_for(&self, model_id: &str) -> Option<&Map<String, Value>> {
        self.model_params.get(model_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_image_model: Option<String>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Settings {
    pub fn provider(&self, provider_id: &str) -> Option<&ProviderSettings> {
        self.providers.get(provider_id)
    }

    /// Settings for `provider_id`, empty if none were saved
    pub fn provider_or_default(&self, provider_id: &str) -> ProviderSettings {
        self.provider(provider_id).cloned().unwrap_or_default()
    }
}

// ============================================================================
// Settings Store
// ============================================================================

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Local key-value persistence for [`Settings`]
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Settings, SettingsError>;
    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

impl<T: SettingsStore + ?Sized> SettingsStore for Arc<T> {
    fn load(&self) -> Result<Settings, SettingsError> {
        (**self).load()
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        (**self).save(settings)
    }
}

/// Process-local settings, lost on exit
#[derive(Debug, Default)]
pub struct InMemorySettings {
    settings: Mutex<Settings>,
}

impl InMemorySettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }

    /// Current contents
    pub fn snapshot(&self) -> Settings {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SettingsStore for InMemorySettings {
    fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self.snapshot())
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        Ok(())
    }
}

/// Settings persisted as a pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileSettings {
    fn load(&self) -> Result<Settings, SettingsError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No settings file, using defaults");
                Ok(Settings::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, text)?;
        tracing::debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

// ============================================================================
// Engine Config
// ============================================================================

/// Startup configuration read from the environment
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Settings file; in-memory settings when unset
    pub settings_path: Option<PathBuf>,
    /// Overrides the stored default model
    pub default_model: Option<String>,
    /// Undo history cap; unbounded when unset
    pub history_limit: Option<usize>,
    pub request_timeout: Duration,
    /// API keys by provider id
    pub api_keys: BTreeMap<String, String>,
    pub custom_endpoint: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settings_path: None,
            default_model: None,
            history_limit: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            api_keys: BTreeMap::new(),
            custom_endpoint: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_keys = [
            (provider::OPENAI, "OPENAI_API_KEY"),
            (provider::ANTHROPIC, "ANTHROPIC_API_KEY"),
            (provider::GOOGLE, "GOOGLE_API_KEY"),
            (provider::DEEPSEEK, "DEEPSEEK_API_KEY"),
            (provider::CUSTOM, "CUSTOM_API_KEY"),
            (provider::STABILITY, "STABILITY_API_KEY"),
        ]
        .into_iter()
        .filter_map(|(provider_id, name)| var(name).map(|key| (provider_id.to_string(), key)))
        .collect();

        let history_limit = var("CHAT_HISTORY_LIMIT").and_then(|raw| match raw.parse::<usize>() {
            Ok(limit) => Some(limit),
            Err(e) => {
                tracing::warn!(value = %raw, error = %e, "Ignoring invalid CHAT_HISTORY_LIMIT");
                None
            }
        });

        let request_timeout = var("CHAT_REQUEST_TIMEOUT_SECS")
            .and_then(|raw| match raw.parse::<u64>() {
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(e) => {
                    tracing::warn!(
                        value = %raw,
                        error = %e,
                        "Ignoring invalid CHAT_REQUEST_TIMEOUT_SECS"
                    );
                    None
                }
            })
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        Self {
            settings_path: var("CHAT_SETTINGS_PATH").map(PathBuf::from),
            default_model: var("CHAT_DEFAULT_MODEL"),
            history_limit,
            request_timeout,
            api_keys,
            custom_endpoint: var("CUSTOM_ENDPOINT"),
        }
    }

    /// Overlay environment values onto loaded settings
    pub fn apply_to(&self, settings: &mut Settings) {
        for (provider_id, key) in &self.api_keys {
            settings.providers.entry(provider_id.clone()).or_default().api_key = Some(key.clone());
        }
        if let Some(endpoint) = &self.custom_endpoint {
            settings.providers.entry(provider::CUSTOM.to_string()).or_default().endpoint =
                Some(endpoint.clone());
        }
        if let Some(model) = &self.default_model {
            settings.default_model = Some(model.clone());
        }
    }
}
