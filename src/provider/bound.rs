//! A model binding with a fixed tool set.

use std::sync::Arc;

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::{
    sanitize_messages_for_model, ModelProvider, ProviderRequest, ProviderResponse,
    ToolDefinition,
};
use crate::error::FlowError;
use crate::models::ModelCapabilities;
use crate::tools::Tool;
use crate::types::{GenerationSettings, MessageChunk, ModelMessage, ResponseFormat};

/// A provider plus the tool definitions it is allowed to call.
#[derive(Clone)]
pub struct BoundModel {
    provider: Arc<dyn ModelProvider>,
    tools: Vec<ToolDefinition>,
    settings: GenerationSettings,
}

/// Bind `tools` to `provider`.
///
/// Binding a non-empty tool set to a model without tool calling support is a
/// configuration error.
pub fn bind_tools(
    provider: Arc<dyn ModelProvider>,
    tools: &[Arc<dyn Tool>],
) -> Result<BoundModel, FlowError> {
    if !tools.is_empty() && !provider.capabilities().supports_tools {
        return Err(FlowError::Configuration(format!(
            "model '{}:{}' does not support tool calling",
            provider.provider_name(),
            provider.model_id()
        )));
    }
    Ok(BoundModel {
        tools: tool_definitions(tools),
        provider,
        settings: GenerationSettings::default(),
    })
}

pub fn tool_definitions(tools: &[Arc<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|tool| ToolDefinition {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters().schema.clone(),
        })
        .collect()
}

impl BoundModel {
    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Same binding restricted to a smaller tool set.
    pub fn rebind(&self, tools: &[Arc<dyn Tool>]) -> Self {
        Self {
            provider: self.provider.clone(),
            tools: tool_definitions(tools),
            settings: self.settings.clone(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    pub fn capabilities(&self) -> &ModelCapabilities {
        self.provider.capabilities()
    }

    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    fn request(
        &self,
        messages: &[ModelMessage],
        response_format: Option<ResponseFormat>,
    ) -> ProviderRequest {
        ProviderRequest {
            messages: sanitize_messages_for_model(messages, self.provider.capabilities()),
            settings: self.settings.clone(),
            tools: if self.tools.is_empty() || response_format.is_some() {
                None
            } else {
                Some(self.tools.clone())
            },
            response_format,
        }
    }

    pub async fn invoke(
        &self,
        messages: &[ModelMessage],
        cancel: CancellationToken,
    ) -> Result<ProviderResponse, FlowError> {
        let request = self.request(messages, None);
        self.provider.generate_text(&request, cancel).await
    }

    pub async fn invoke_structured(
        &self,
        messages: &[ModelMessage],
        format: ResponseFormat,
        cancel: CancellationToken,
    ) -> Result<ProviderResponse, FlowError> {
        let request = self.request(messages, Some(format));
        self.provider.generate_text(&request, cancel).await
    }

    pub async fn stream(
        &self,
        messages: &[ModelMessage],
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<MessageChunk, FlowError>>, FlowError> {
        let request = self.request(messages, None);
        self.provider.stream_text(&request, cancel).await
    }

    pub async fn count_tokens(&self, text: &str) -> Result<usize, FlowError> {
        self.provider.count_tokens(text).await
    }
}

impl std::fmt::Debug for BoundModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundModel")
            .field("provider", &self.provider.provider_name())
            .field("model_id", &self.provider.model_id())
            .field("tools", &self.tools.len())
            .finish()
    }
}
