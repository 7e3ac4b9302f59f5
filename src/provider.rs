//! Provider adapters
//!
//! One adapter per remote chat API. An adapter knows the endpoint, the
//! auth headers, the request body shape and how to find the text delta in
//! one streamed event. Everything else (transport, decoding, state) is
//! shared.

mod anthropic;
mod gemini;
mod openai;
mod registry;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiCompatibleAdapter;
pub use registry::AdapterRegistry;

use crate::chat::ContextMessage;
use crate::decoder::DeltaExtractor;
use crate::settings::ProviderSettings;
use crate::transport::ProviderRequest;
use serde_json::Value;
use thiserror::Error;

pub const OPENAI: &str = "openai";
pub const ANTHROPIC: &str = "anthropic";
pub const GOOGLE: &str = "google";
pub const DEEPSEEK: &str = "deepseek";
pub const CUSTOM: &str = "custom";
pub const STABILITY: &str = "stabilityai";

/// Request cannot be built from the current settings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("no API key configured for provider {0}")]
    MissingApiKey(String),
    #[error("no endpoint configured for provider {0}")]
    MissingEndpoint(String),
}

/// Common interface for chat providers
pub trait ProviderAdapter: DeltaExtractor + Send + Sync {
    fn provider_id(&self) -> &str;

    /// Streaming endpoint for `model_id`; `None` when it must come from
    /// settings and none is configured
    fn endpoint(&self, model_id: &str, settings: &ProviderSettings) -> Option<String>;

    fn auth_headers(&self, api_key: &str) -> Vec<(String, String)>;

    /// Provider-shaped body for a streaming completion
    fn build_body(&self, model_id: &str, messages: &[ContextMessage]) -> Value;

    /// Verify settings carry what a request needs
    fn check(&self, model_id: &str, settings: &ProviderSettings) -> Result<(), ProviderError> {
        if settings.api_key().is_none() {
            return Err(ProviderError::MissingApiKey(self.provider_id().to_string()));
        }
        if self.endpoint(model_id, settings).is_none() {
            return Err(ProviderError::MissingEndpoint(self.provider_id().to_string()));
        }
        Ok(())
    }

    /// Full request: endpoint, auth headers and body with the model's
    /// stored parameters merged in
    fn build_request(
        &self,
        model_id: &str,
        messages: &[ContextMessage],
        settings: &ProviderSettings,
    ) -> Result<ProviderRequest, ProviderError> {
        let api_key = settings
            .api_key()
            .ok_or_else(|| ProviderError::MissingApiKey(self.provider_id().to_string()))?;
        let url = self
            .endpoint(model_id, settings)
            .ok_or_else(|| ProviderError::MissingEndpoint(self.provider_id().to_string()))?;

        let mut body = self.build_body(model_id, messages);
        if let (Some(params), Value::Object(fields)) = (settings.params_for(model_id), &mut body) {
            for (key, value) in params {
                fields.insert(key.clone(), value.clone());
            }
        }

        Ok(ProviderRequest {
            url,
            headers: self.auth_headers(api_key),
            body,
        })
    }
}

fn bearer(api_key: &str) -> Vec<(String, String)> {
    vec![("Authorization".to_string(), format!("Bearer {api_key}"))]
}
