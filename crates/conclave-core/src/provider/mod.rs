//! Provider adapters.
//!
//! A provider is one external text-generation service. The orchestrator only
//! sees the [`Provider`] trait; adapters own transport, auth, and pricing.

mod echo;
#[cfg(feature = "http")]
mod http;

pub use echo::EchoProvider;
#[cfg(feature = "http")]
pub use http::OpenAiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ProviderError;
pub use crate::types::Artifact;

/// Options passed with every generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    /// Extra system-level context, sent ahead of the prompt.
    pub context: Option<String>,
}

/// A completed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub content: String,
    pub tokens_used: u64,
    pub cost: f64,
    pub response_time_ms: u64,
    pub artifacts: Vec<Artifact>,
}

/// External text-generation service.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier referenced by chain steps.
    fn id(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError>;
}

/// Providers keyed by id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one with the same id.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = ProviderRegistry::new()
            .with(Arc::new(EchoProvider::new("alpha")))
            .with(Arc::new(EchoProvider::new("beta")));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("alpha"));
        assert!(!registry.contains("gamma"));
        assert_eq!(registry.ids(), vec!["alpha".to_string(), "beta".to_string()]);
        assert_eq!(registry.get("beta").map(|p| p.id().to_string()), Some("beta".into()));
    }

    #[test]
    fn test_generate_options_partial_deserialize() {
        let options: GenerateOptions = serde_json::from_str(r#"{ "temperature": 0.2 }"#).unwrap();
        assert_eq!(options.temperature, Some(0.2));
        assert_eq!(options.max_tokens, None);
    }
}
