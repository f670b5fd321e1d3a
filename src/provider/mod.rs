//! Model binding: provider trait, tool binding, registry, and request shaping.

pub mod bound;
pub mod factory;
pub mod registry;
pub mod sanitize;
pub mod stream;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::FlowError;
use crate::models::ModelCapabilities;
use crate::types::{
    AgentToolCall, FinishReason, GenerationSettings, ImageContent, MessageChunk, ModelMessage,
    ResponseFormat, Usage,
};

pub use bound::{bind_tools, BoundModel};
pub use factory::ProviderFactory;
pub use registry::ProviderRegistry;
pub use sanitize::sanitize_messages_for_model;
pub use stream::ChunkAggregator;

/// A request sent to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub messages: Vec<ModelMessage>,
    pub settings: GenerationSettings,
    pub tools: Option<Vec<ToolDefinition>>,
    pub response_format: Option<ResponseFormat>,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One complete assistant response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub text: String,
    pub usage: Usage,
    pub tool_calls: Vec<AgentToolCall>,
    pub finish_reason: Option<FinishReason>,
    /// Inline images generated by the model.
    pub images: Vec<ImageContent>,
}

impl ProviderResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Core trait implemented by all model bindings.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai", "google").
    fn provider_name(&self) -> &str;
    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// Capabilities of the model.
    fn capabilities(&self) -> &ModelCapabilities;

    /// Generate one response (non-streaming).
    async fn generate_text(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<ProviderResponse, FlowError>;

    /// Generate one response as a chunk stream.
    ///
    /// The default wraps [`ModelProvider::generate_text`] into a single chunk.
    async fn stream_text(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<MessageChunk, FlowError>>, FlowError> {
        let response = self.generate_text(request, cancel).await?;
        Ok(stream::single_chunk_stream(response))
    }

    /// Count tokens in `text` the way this model does.
    ///
    /// The default is a four-characters-per-token estimate.
    async fn count_tokens(&self, text: &str) -> Result<usize, FlowError> {
        Ok(estimate_text_tokens(text))
    }
}

pub fn estimate_text_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(4)
}
