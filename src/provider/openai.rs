//! Chat-completions compatible providers (`OpenAI`, `DeepSeek`, custom)

use super::{bearer, ProviderAdapter, CUSTOM, DEEPSEEK, OPENAI};
use crate::chat::ContextMessage;
use crate::decoder::{ChatCompletionDeltas, DeltaExtractor};
use crate::settings::ProviderSettings;
use serde::Serialize;
use serde_json::Value;

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEEPSEEK_ENDPOINT: &str = "https://api.deepseek.com/v1/chat/completions";

/// Adapter for any API speaking the chat-completions wire format.
///
/// Without a fixed endpoint, the endpoint comes from provider settings.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleAdapter {
    provider_id: &'static str,
    endpoint: Option<&'static str>,
}

impl OpenAiCompatibleAdapter {
    pub fn openai() -> Self {
        Self {
            provider_id: OPENAI,
            endpoint: Some(OPENAI_ENDPOINT),
        }
    }

    pub fn deepseek() -> Self {
        Self {
            provider_id: DEEPSEEK,
            endpoint: Some(DEEPSEEK_ENDPOINT),
        }
    }

    pub fn custom() -> Self {
        Self {
            provider_id: CUSTOM,
            endpoint: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ContextMessage],
    stream: bool,
}

impl DeltaExtractor for OpenAiCompatibleAdapter {
    fn extract_delta(&self, payload: &Value) -> Option<String> {
        ChatCompletionDeltas.extract_delta(payload)
    }
}

impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn provider_id(&self) -> &str {
        self.provider_id
    }

    fn endpoint(&self, _model_id: &str, settings: &ProviderSettings) -> Option<String> {
        match self.endpoint {
            Some(url) => Some(url.to_string()),
            None => settings.endpoint().map(str::to_string),
        }
    }

    fn auth_headers(&self, api_key: &str) -> Vec<(String, String)> {
        bearer(api_key)
    }

    fn build_body(&self, model_id: &str, messages: &[ContextMessage]) -> Value {
        let request = ChatCompletionRequest {
            model: model_id,
            messages,
            stream: true,
        };
        serde_json::to_value(request).unwrap_or(Value::Null)
    }
}
