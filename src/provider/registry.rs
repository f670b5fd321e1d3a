//! Provider registry: resolves model selectors to bindings by lookup.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ModelProvider, ProviderFactory};
use crate::error::FlowError;
use crate::models::ModelSelector;
use crate::types::GenerationSettings;

/// Registry mapping provider keys to their factories.
///
/// Populated once at startup; nodes name a model by selector and the
/// orchestrator resolves it here.
#[derive(Clone)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory for all provider keys it declares.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        for key in factory.provider_keys() {
            self.factories.insert(key.to_string(), factory.clone());
        }
    }

    /// Create a model binding by looking up the registered factory.
    pub fn create_provider(
        &self,
        selector: &ModelSelector,
        settings: &GenerationSettings,
    ) -> Result<Arc<dyn ModelProvider>, FlowError> {
        self.factories
            .get(&selector.provider)
            .ok_or_else(|| {
                FlowError::ModelNotFound(format!(
                    "No provider factory registered for '{}'",
                    selector.provider
                ))
            })?
            .create(&selector.provider, &selector.model_id, settings)
    }

    /// Check whether a factory is registered for the given key.
    pub fn has_provider(&self, provider_key: &str) -> bool {
        self.factories.contains_key(provider_key)
    }

    /// List all registered provider keys.
    pub fn provider_keys(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelCapabilities;
    use crate::provider::{ProviderRequest, ProviderResponse};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct StubFactory;

    impl ProviderFactory for StubFactory {
        fn provider_keys(&self) -> &[&str] {
            &["stub", "stub-alias"]
        }

        fn create(
            &self,
            provider_key: &str,
            model_id: &str,
            _settings: &GenerationSettings,
        ) -> Result<Arc<dyn ModelProvider>, FlowError> {
            Ok(Arc::new(StubProvider {
                name: provider_key.to_string(),
                model_id: model_id.to_string(),
                caps: ModelCapabilities::default(),
            }))
        }
    }

    struct StubProvider {
        name: String,
        model_id: String,
        caps: ModelCapabilities,
    }

    #[async_trait]
    impl ModelProvider for StubProvider {
        fn provider_name(&self) -> &str {
            &self.name
        }
        fn model_id(&self) -> &str {
            &self.model_id
        }
        fn capabilities(&self) -> &ModelCapabilities {
            &self.caps
        }
        async fn generate_text(
            &self,
            _request: &ProviderRequest,
            _cancel: CancellationToken,
        ) -> Result<ProviderResponse, FlowError> {
            Ok(ProviderResponse::text("stub"))
        }
    }

    #[test]
    fn register_and_create() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubFactory));

        assert!(registry.has_provider("stub"));
        assert!(registry.has_provider("stub-alias"));
        assert!(!registry.has_provider("unknown"));

        let provider = registry
            .create_provider(&ModelSelector::new("stub", "my-model"), &GenerationSettings::default())
            .unwrap();
        assert_eq!(provider.model_id(), "my-model");
        assert_eq!(provider.provider_name(), "stub");
    }

    #[test]
    fn create_unregistered_fails_as_configuration() {
        let registry = ProviderRegistry::new();
        let result = registry
            .create_provider(&ModelSelector::new("nope", "m"), &GenerationSettings::default());
        match result {
            Err(FlowError::ModelNotFound(msg)) => assert!(msg.contains("nope")),
            Err(e) => panic!("expected ModelNotFound, got error: {e}"),
            Ok(_) => panic!("expected ModelNotFound, got Ok"),
        }
    }

    #[test]
    fn provider_keys_lists_all_registered_keys() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubFactory));

        let mut keys = registry.provider_keys();
        keys.sort();
        assert_eq!(keys, vec!["stub", "stub-alias"]);
    }

    #[tokio::test]
    async fn default_stream_wraps_generate_text() {
        use futures::StreamExt;

        let provider = StubProvider {
            name: "stub".into(),
            model_id: "m".into(),
            caps: ModelCapabilities::default(),
        };
        let request = ProviderRequest {
            messages: vec![],
            settings: GenerationSettings::default(),
            tools: None,
            response_format: None,
        };
        let chunks: Vec<_> = provider
            .stream_text(&request, CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().text, "stub");
        assert_eq!(provider.count_tokens("abcdefgh").await.unwrap(), 2);
    }
}
