//! Provider factory trait for creating ModelProvider instances.

use std::sync::Arc;

use super::ModelProvider;
use crate::error::FlowError;
use crate::types::GenerationSettings;

/// Factory for creating model bindings from a provider key + model ID.
pub trait ProviderFactory: Send + Sync {
    /// Provider key(s) this factory handles (e.g., &["openai", "azure-openai"]).
    fn provider_keys(&self) -> &[&str];

    /// Create a model binding for the given model ID and node settings.
    fn create(
        &self,
        provider_key: &str,
        model_id: &str,
        settings: &GenerationSettings,
    ) -> Result<Arc<dyn ModelProvider>, FlowError>;
}
