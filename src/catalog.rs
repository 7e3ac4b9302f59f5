//! Model catalog
//!
//! Built-in model definitions plus whatever a remote catalog service
//! reports. Lookups answer "which provider serves this model" and "what do
//! we call it".

use crate::provider::{ANTHROPIC, CUSTOM, DEEPSEEK, GOOGLE, OPENAI, STABILITY};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a model produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Text,
    Image,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Text => f.write_str("text"),
            ModelKind::Image => f.write_str("image"),
        }
    }
}

/// Static model definition
#[derive(Debug, Clone, Copy)]
pub struct ModelDef {
    pub id: &'static str,
    pub name: &'static str,
    pub provider: &'static str,
    pub description: &'static str,
    pub kind: ModelKind,
}

/// Models available without a remote catalog
pub fn builtin_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "gpt-3.5-turbo",
            name: "GPT-3.5 Turbo",
            provider: OPENAI,
            description: "Fast, inexpensive chat model",
            kind: ModelKind::Text,
        },
        ModelDef {
            id: "gpt-4",
            name: "GPT-4",
            provider: OPENAI,
            description: "OpenAI's most capable chat model",
            kind: ModelKind::Text,
        },
        ModelDef {
            id: "claude-3-opus",
            name: "Claude 3 Opus",
            provider: ANTHROPIC,
            description: "Anthropic's most capable model",
            kind: ModelKind::Text,
        },
        ModelDef {
            id: "claude-3-sonnet",
            name: "Claude 3 Sonnet",
            provider: ANTHROPIC,
            description: "Balanced speed and capability",
            kind: ModelKind::Text,
        },
        ModelDef {
            id: "gemini-pro",
            name: "Gemini Pro",
            provider: GOOGLE,
            description: "Google's general-purpose model",
            kind: ModelKind::Text,
        },
        ModelDef {
            id: "deepseek-chat",
            name: "DeepSeek Chat",
            provider: DEEPSEEK,
            description: "General chat model",
            kind: ModelKind::Text,
        },
        ModelDef {
            id: "deepseek-coder",
            name: "DeepSeek Coder",
            provider: DEEPSEEK,
            description: "Code-focused model",
            kind: ModelKind::Text,
        },
        ModelDef {
            id: "custom-model",
            name: "Custom Model",
            provider: CUSTOM,
            description: "Any chat-completions compatible endpoint",
            kind: ModelKind::Text,
        },
        ModelDef {
            id: "dall-e-3",
            name: "DALL-E 3",
            provider: OPENAI,
            description: "Image generation",
            kind: ModelKind::Image,
        },
        ModelDef {
            id: "stable-diffusion-xl-1024-v1-0",
            name: "Stable Diffusion XL",
            provider: STABILITY,
            description: "Image generation",
            kind: ModelKind::Image,
        },
    ]
}

// ============================================================================
// Remote catalog wire format
// ============================================================================

/// Catalog service response: providers, each with its models
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogResponse {
    #[serde(default)]
    pub providers: Vec<CatalogProvider>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProvider {
    pub provider_id: String,
    pub name: String,
    #[serde(default)]
    pub models: Vec<CatalogModel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogModel {
    pub model_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default, rename = "type")]
    pub kind: Option<ModelKind>,
}

// ============================================================================
// Catalog
// ============================================================================

/// Flattened model entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider_id: String,
    pub provider_name: Option<String>,
    pub description: String,
    pub is_paid: bool,
    pub kind: ModelKind,
}

impl From<&ModelDef> for ModelInfo {
    fn from(def: &ModelDef) -> Self {
        Self {
            id: def.id.to_string(),
            name: def.name.to_string(),
            provider_id: def.provider.to_string(),
            provider_name: None,
            description: def.description.to_string(),
            is_paid: false,
            kind: def.kind,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: Vec<ModelInfo>,
}

impl ModelCatalog {
    pub fn builtin() -> Self {
        Self {
            models: builtin_models().iter().map(ModelInfo::from).collect(),
        }
    }

    /// Flatten a catalog response; a model without `type` is a text model
    pub fn from_response(response: CatalogResponse) -> Self {
        let models = response
            .providers
            .into_iter()
            .flat_map(|provider| {
                let provider_id = provider.provider_id;
                let provider_name = provider.name;
                provider.models.into_iter().map(move |model| ModelInfo {
                    id: model.model_id,
                    name: model.name,
                    provider_id: provider_id.clone(),
                    provider_name: Some(provider_name.clone()),
                    description: model.description,
                    is_paid: model.is_paid,
                    kind: model.kind.unwrap_or_default(),
                })
            })
            .collect();
        Self { models }
    }

    /// Add `other`'s models; entries with a known id replace the old one
    pub fn merge(&mut self, other: ModelCatalog) {
        for model in other.models {
            match self.models.iter_mut().find(|existing| existing.id == model.id) {
                Some(existing) => *existing = model,
                None => self.models.push(model),
            }
        }
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == model_id)
    }

    pub fn provider_for(&self, model_id: &str) -> Option<&str> {
        self.get(model_id).map(|m| m.provider_id.as_str())
    }

    /// Display name, falling back to the id itself
    pub fn name_for<'a>(&'a self, model_id: &'a str) -> &'a str {
        self.get(model_id).map_or(model_id, |m| m.name.as_str())
    }

    pub fn models(&self) -> &[ModelInfo] {
        &self.models
    }

    pub fn by_kind(&self, kind: ModelKind) -> impl Iterator<Item = &ModelInfo> {
        self.models.iter().filter(move |m| m.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_are_unique() {
        let mut ids: Vec<&str> = builtin_models().iter().map(|m| m.id).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn test_builtin_lookups() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.provider_for("claude-3-opus"), Some("anthropic"));
        assert_eq!(catalog.provider_for("deepseek-coder"), Some("deepseek"));
        assert_eq!(catalog.name_for("gpt-4"), "GPT-4");
        assert_eq!(catalog.name_for("mystery"), "mystery");
        assert_eq!(catalog.provider_for("mystery"), None);
        assert_eq!(catalog.by_kind(ModelKind::Image).count(), 2);
    }

    #[test]
    fn test_response_flattens_and_defaults_kind() {
        let response: CatalogResponse = serde_json::from_value(serde_json::json!({
            "providers": [
                {"providerId": "openai", "name": "OpenAI", "models": [
                    {"modelId": "gpt-4o", "name": "GPT-4o", "isPaid": true},
                    {"modelId": "dall-e-2", "name": "DALL-E 2", "type": "image"}
                ]},
                {"providerId": "empty", "name": "Nothing"}
            ]
        }))
        .unwrap();

        let catalog = ModelCatalog::from_response(response);
        assert_eq!(catalog.models().len(), 2);

        let gpt = catalog.get("gpt-4o").unwrap();
        assert_eq!(gpt.kind, ModelKind::Text);
        assert!(gpt.is_paid);
        assert_eq!(gpt.provider_name.as_deref(), Some("OpenAI"));
        assert_eq!(catalog.get("dall-e-2").unwrap().kind, ModelKind::Image);
    }

    #[test]
    fn test_merge_replaces_by_id() {
        let mut catalog = ModelCatalog::builtin();
        let before = catalog.models().len();
        let response: CatalogResponse = serde_json::from_value(serde_json::json!({
            "providers": [{"providerId": "openai", "name": "OpenAI", "models": [
                {"modelId": "gpt-4", "name": "GPT-4 (remote)"},
                {"modelId": "gpt-4o", "name": "GPT-4o"}
            ]}]
        }))
        .unwrap();

        catalog.merge(ModelCatalog::from_response(response));
        assert_eq!(catalog.models().len(), before + 1);
        assert_eq!(catalog.name_for("gpt-4"), "GPT-4 (remote)");
    }
}
