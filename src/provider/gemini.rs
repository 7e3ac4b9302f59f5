//! Google Gemini adapter

use super::{ProviderAdapter, GOOGLE};
use crate::chat::{ContextMessage, Role};
use crate::decoder::DeltaExtractor;
use crate::settings::ProviderSettings;
use serde::Serialize;
use serde_json::Value;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiAdapter;

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: [GeminiPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

impl DeltaExtractor for GeminiAdapter {
    /// Concatenated text of the first candidate's parts
    fn extract_delta(&self, payload: &Value) -> Option<String> {
        let parts = payload.pointer("/candidates/0/content/parts")?.as_array()?;
        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        Some(text)
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn provider_id(&self) -> &str {
        GOOGLE
    }

    fn endpoint(&self, model_id: &str, _settings: &ProviderSettings) -> Option<String> {
        Some(format!("{BASE_URL}/{model_id}:streamGenerateContent?alt=sse"))
    }

    fn auth_headers(&self, api_key: &str) -> Vec<(String, String)> {
        vec![("x-goog-api-key".to_string(), api_key.to_string())]
    }

    fn build_body(&self, _model_id: &str, messages: &[ContextMessage]) -> Value {
        let contents = messages
            .iter()
            .map(|message| GeminiContent {
                role: match message.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                },
                parts: [GeminiPart {
                    text: &message.content,
                }],
            })
            .collect();
        serde_json::to_value(GenerateContentRequest { contents }).unwrap_or(Value::Null)
    }
}
