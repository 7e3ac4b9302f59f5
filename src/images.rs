//! Image generation requests and response unwrapping

use crate::provider::{CUSTOM, OPENAI, STABILITY};
use crate::settings::ProviderSettings;
use crate::transport::{ProviderRequest, TransportError};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_IMAGE_COUNT: u32 = 1;
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

const OPENAI_IMAGES: &str = "https://api.openai.com/v1/images/generations";
const STABILITY_IMAGES: &str =
    "https://api.stability.ai/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub n: Option<u32>,
    pub size: Option<String>,
}

impl ImageRequest {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            prompt: prompt.into(),
            n: None,
            size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("image prompt must not be empty")]
    BlankPrompt,
    #[error("no API key configured for provider {0}")]
    MissingApiKey(String),
    #[error("no image endpoint for provider {0}")]
    MissingEndpoint(String),
    #[error("image request failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Serialize)]
struct ImageGenerationBody<'a> {
    provider: &'a str,
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<&'a str>,
}

/// Image endpoint for `provider`; the custom provider uses its settings
pub fn image_endpoint(provider: &str, settings: &ProviderSettings) -> Option<String> {
    match provider {
        OPENAI => Some(OPENAI_IMAGES.to_string()),
        STABILITY => Some(STABILITY_IMAGES.to_string()),
        CUSTOM => settings.endpoint().map(str::to_string),
        _ => None,
    }
}

pub fn build_image_request(
    request: &ImageRequest,
    settings: &ProviderSettings,
) -> Result<ProviderRequest, ImageError> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ImageError::BlankPrompt);
    }
    let api_key = settings
        .api_key()
        .ok_or_else(|| ImageError::MissingApiKey(request.provider.clone()))?;
    let url = image_endpoint(&request.provider, settings)
        .ok_or_else(|| ImageError::MissingEndpoint(request.provider.clone()))?;

    let body = ImageGenerationBody {
        provider: &request.provider,
        model: &request.model,
        prompt,
        n: request.n.unwrap_or(DEFAULT_IMAGE_COUNT),
        size: request.size.as_deref().unwrap_or(DEFAULT_IMAGE_SIZE),
        endpoint: if request.provider == CUSTOM {
            settings.endpoint()
        } else {
            None
        },
    };

    Ok(ProviderRequest {
        url,
        headers: vec![("Authorization".to_string(), format!("Bearer {api_key}"))],
        body: serde_json::to_value(body).unwrap_or(Value::Null),
    })
}

/// Image URLs (or data URLs) from a provider response.
///
/// `OpenAI` returns `data[].url`, Stability returns base64 `artifacts`,
/// anything else is read from `images` or `urls`.
pub fn unwrap_image_response(provider: &str, response: &Value) -> Vec<String> {
    let strings = |items: Option<&Value>, field: Option<&str>| -> Vec<String> {
        items
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match field {
                        Some(field) => item.get(field).and_then(Value::as_str),
                        None => item.as_str(),
                    })
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    match provider {
        OPENAI => strings(response.get("data"), Some("url")),
        STABILITY => strings(response.get("artifacts"), Some("base64"))
            .into_iter()
            .map(|encoded| format!("data:image/png;base64,{encoded}"))
            .collect(),
        _ => {
            let images = strings(response.get("images"), None);
            if images.is_empty() {
                strings(response.get("urls"), None)
            } else {
                images
            }
        }
    }
}
