//! Adapter lookup by provider id

use super::{AnthropicAdapter, GeminiAdapter, OpenAiCompatibleAdapter, ProviderAdapter};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of provider adapters
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl AdapterRegistry {
    pub fn new_empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// `OpenAI`, Anthropic, Google, `DeepSeek` and the custom endpoint
    pub fn with_defaults() -> Self {
        let mut registry = Self::new_empty();
        registry.register(Arc::new(OpenAiCompatibleAdapter::openai()));
        registry.register(Arc::new(AnthropicAdapter));
        registry.register(Arc::new(GeminiAdapter));
        registry.register(Arc::new(OpenAiCompatibleAdapter::deepseek()));
        registry.register(Arc::new(OpenAiCompatibleAdapter::custom()));
        registry
    }

    /// Add or replace the adapter for its provider id
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider_id().to_string(), adapter);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider_id).cloned()
    }

    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }
}
