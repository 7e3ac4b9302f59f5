//! Anthropic Messages API adapter

use super::{ProviderAdapter, ANTHROPIC};
use crate::chat::ContextMessage;
use crate::decoder::DeltaExtractor;
use crate::settings::ProviderSettings;
use serde::Serialize;
use serde_json::Value;

const ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [ContextMessage],
    stream: bool,
}

impl DeltaExtractor for AnthropicAdapter {
    /// Only `content_block_delta` events carry text
    fn extract_delta(&self, payload: &Value) -> Option<String> {
        if payload.get("type").and_then(Value::as_str) != Some("content_block_delta") {
            return None;
        }
        payload
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn provider_id(&self) -> &str {
        ANTHROPIC
    }

    fn endpoint(&self, _model_id: &str, _settings: &ProviderSettings) -> Option<String> {
        Some(ENDPOINT.to_string())
    }

    fn auth_headers(&self, api_key: &str) -> Vec<(String, String)> {
        vec![
            ("x-api-key".to_string(), api_key.to_string()),
            ("anthropic-version".to_string(), API_VERSION.to_string()),
        ]
    }

    fn build_body(&self, model_id: &str, messages: &[ContextMessage]) -> Value {
        let request = MessagesRequest {
            model: model_id,
            max_tokens: DEFAULT_MAX_TOKENS,
            messages,
            stream: true,
        };
        serde_json::to_value(request).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_uses_api_key_header() {
        let headers = AnthropicAdapter.auth_headers("key");
        assert!(headers.contains(&("x-api-key".to_string(), "key".to_string())));
        assert!(!headers.iter().any(|(name, _)| name == "Authorization"));
    }

    #[test]
    fn test_extracts_only_text_deltas() {
        let text = json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": "Hel"}
        });
        let start = json!({"type": "message_start", "message": {"id": "msg_1"}});
        let stop = json!({"type": "message_stop"});

        assert_eq!(AnthropicAdapter.extract_delta(&text).as_deref(), Some("Hel"));
        assert_eq!(AnthropicAdapter.extract_delta(&start), None);
        assert_eq!(AnthropicAdapter.extract_delta(&stop), None);
    }

    #[test]
    fn test_body_carries_max_tokens() {
        let body = AnthropicAdapter.build_body("claude-3-opus", &[ContextMessage::user("hi")]);
        assert_eq!(body["max_tokens"], json!(DEFAULT_MAX_TOKENS));
        assert_eq!(body["messages"][0]["role"], json!("user"));
    }
}
