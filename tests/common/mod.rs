//! Shared test helpers: scripted provider, recording sink, sample tools.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use flowagent::agent::{AgentOrchestrator, TurnEnvironment};
use flowagent::agent_loop::{StreamEvent, StreamSink};
use flowagent::config::EngineConfig;
use flowagent::error::FlowError;
use flowagent::images::{FileStore, InMemoryFileStore};
use flowagent::models::{ModelCapabilities, ModelSelector};
use flowagent::provider::{
    ModelProvider, ProviderFactory, ProviderRegistry, ProviderRequest, ProviderResponse,
};
use flowagent::tools::{AgentTool, AgentToolParameters, Tool, ToolRegistry};
use flowagent::types::*;

/// A provider replaying queued responses in order.
///
/// Streaming splits each response's text into word chunks; the last chunk
/// carries tool calls, usage and finish reason.
pub struct ScriptedProvider {
    model_id: String,
    capabilities: ModelCapabilities,
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    chunk_delay: Option<Duration>,
    word_tokens: bool,
    fail_stream: bool,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            model_id: "scripted".to_string(),
            capabilities: ModelCapabilities::full(),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
            chunk_delay: None,
            word_tokens: false,
            fail_stream: false,
        }
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Wait this long before answering (cancellable).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Pause this long after every streamed word.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Count one token per whitespace-separated word.
    pub fn counting_words(mut self) -> Self {
        self.word_tokens = true;
        self
    }

    /// Break every stream after its text chunks.
    pub fn failing_streams(mut self) -> Self {
        self.fail_stream = true;
        self
    }

    pub fn queue(&self, response: ProviderResponse) -> &Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn queue_response(&self, text: &str) -> &Self {
        self.queue(ProviderResponse {
            text: text.to_string(),
            usage: Usage::new(10, 20),
            tool_calls: Vec::new(),
            finish_reason: Some(FinishReason::Stop),
            images: Vec::new(),
        })
    }

    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) -> &Self {
        self.queue_tool_calls("", &[(id, name, args)])
    }

    pub fn queue_tool_calls(&self, text: &str, calls: &[(&str, &str, serde_json::Value)]) -> &Self {
        self.queue(ProviderResponse {
            text: text.to_string(),
            usage: Usage::new(10, 5),
            tool_calls: calls
                .iter()
                .map(|(id, name, args)| AgentToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: args.clone(),
                })
                .collect(),
            finish_reason: Some(FinishReason::ToolCalls),
            images: Vec::new(),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> ProviderRequest {
        self.requests().pop().expect("at least one request")
    }

    async fn next_response(
        &self,
        request: &ProviderRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse, FlowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(FlowError::Canceled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| ProviderResponse {
            text: "Mock response".to_string(),
            usage: Usage::new(1, 1),
            finish_reason: Some(FinishReason::Stop),
            ..Default::default()
        }))
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    async fn generate_text(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<ProviderResponse, FlowError> {
        self.next_response(request, &cancel).await
    }

    async fn stream_text(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<MessageChunk, FlowError>>, FlowError> {
        let response = self.next_response(request, &cancel).await?;
        let words: Vec<String> = response
            .text
            .split_inclusive(' ')
            .map(str::to_string)
            .collect();
        let fail = self.fail_stream;
        let chunk_delay = self.chunk_delay;
        Ok(Box::pin(async_stream::stream! {
            for word in words {
                yield Ok(MessageChunk::text(word));
                if let Some(delay) = chunk_delay {
                    tokio::time::sleep(delay).await;
                }
            }
            if fail {
                yield Err(FlowError::Stream("connection reset".into()));
                return;
            }
            yield Ok(MessageChunk {
                text: String::new(),
                tool_calls: Some(response.tool_calls),
                usage: Some(response.usage),
                finish_reason: response.finish_reason,
                images: response.images,
            });
        }))
    }

    async fn count_tokens(&self, text: &str) -> Result<usize, FlowError> {
        if self.word_tokens {
            Ok(text.split_whitespace().count())
        } else {
            Ok(flowagent::provider::estimate_text_tokens(text))
        }
    }
}

/// Factory handing out one shared provider for the `scripted` key.
pub struct SharedProviderFactory(pub Arc<ScriptedProvider>);

impl ProviderFactory for SharedProviderFactory {
    fn provider_keys(&self) -> &[&str] {
        &["scripted"]
    }

    fn create(
        &self,
        _provider_key: &str,
        _model_id: &str,
        _settings: &GenerationSettings,
    ) -> Result<Arc<dyn ModelProvider>, FlowError> {
        Ok(self.0.clone())
    }
}

/// Sink recording every event in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StreamEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                StreamEvent::Token { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn end_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, StreamEvent::End))
            .count()
    }

    fn push(&self, event: StreamEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl StreamSink for RecordingSink {
    fn token(&self, text: &str) {
        self.push(StreamEvent::Token { text: text.to_string() });
    }
    fn called_tools(&self, calls: &[AgentToolCall]) {
        self.push(StreamEvent::CalledTools { calls: calls.to_vec() });
    }
    fn used_tools(&self, tools: &[UsedTool]) {
        self.push(StreamEvent::UsedTools { tools: tools.to_vec() });
    }
    fn source_documents(&self, documents: &[SourceDocument]) {
        self.push(StreamEvent::SourceDocuments { documents: documents.to_vec() });
    }
    fn artifacts(&self, artifacts: &[Artifact]) {
        self.push(StreamEvent::Artifacts { artifacts: artifacts.to_vec() });
    }
    fn usage_metadata(&self, usage: &Usage) {
        self.push(StreamEvent::UsageMetadata { usage: *usage });
    }
    fn end(&self) {
        self.push(StreamEvent::End);
    }
}

/// `get_weather` returning a fixed forecast and counting its invocations.
pub fn weather_tool(calls: Arc<AtomicUsize>) -> AgentTool {
    AgentTool::new(
        "get_weather",
        "Current weather for a city",
        AgentToolParameters::object()
            .string("city", "City name", true)
            .build(),
        move |_args, _ctx| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!("15C, sunny"))
            }
        },
    )
}

/// A tool answering with `output` for any arguments.
pub fn echo_tool(name: &str, output: &'static str) -> AgentTool {
    AgentTool::new(name, "Test tool", AgentToolParameters::empty(), move |_args, _ctx| async move {
        Ok(json!(output))
    })
}

pub fn failing_tool(name: &str, message: &'static str) -> AgentTool {
    let tool_name = name.to_string();
    AgentTool::new(name, "Always fails", AgentToolParameters::empty(), move |_args, _ctx| {
        let tool_name = tool_name.clone();
        async move { Err(FlowError::tool(tool_name, message)) }
    })
}

pub fn arc_tool(tool: AgentTool) -> Arc<dyn Tool> {
    Arc::new(tool)
}

/// Alternating user/assistant messages, each holding `words` words of filler.
pub fn filler_history(count: usize, words: usize) -> Vec<ModelMessage> {
    (0..count)
        .map(|i| {
            let text = vec!["lorem"; words].join(" ");
            if i % 2 == 0 {
                ModelMessage::user(text)
            } else {
                ModelMessage::assistant(text)
            }
        })
        .collect()
}

pub fn selector() -> ModelSelector {
    ModelSelector::new("scripted", "test-model")
}

/// Orchestrator wired to `provider`, with each tool registered under its name.
pub fn orchestrator(provider: Arc<ScriptedProvider>, tools: Vec<AgentTool>) -> AgentOrchestrator {
    orchestrator_with_files(provider, tools, Arc::new(InMemoryFileStore::new()))
}

pub fn orchestrator_with_files(
    provider: Arc<ScriptedProvider>,
    tools: Vec<AgentTool>,
    files: Arc<dyn FileStore>,
) -> AgentOrchestrator {
    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(SharedProviderFactory(provider)));
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register_tool(Arc::new(tool));
    }
    AgentOrchestrator::new(providers, registry, files, EngineConfig::default())
}

/// Environment of the visible terminal node streaming into `sink`.
pub fn visible(sink: &Arc<RecordingSink>) -> TurnEnvironment {
    let sink: Arc<dyn StreamSink> = sink.clone();
    TurnEnvironment::new().with_chat_id("chat-1").last_node(Some(sink))
}
