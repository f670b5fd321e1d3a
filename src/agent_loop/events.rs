//! Stream sink contract and the emitter that enforces its ordering rules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{AgentToolCall, Artifact, SourceDocument, Usage, UsedTool};

/// Observer receiving a turn's incremental output.
pub trait StreamSink: Send + Sync {
    fn token(&self, text: &str);
    fn called_tools(&self, calls: &[AgentToolCall]);
    fn used_tools(&self, tools: &[UsedTool]);
    fn source_documents(&self, documents: &[SourceDocument]);
    fn artifacts(&self, artifacts: &[Artifact]);
    fn usage_metadata(&self, usage: &Usage);
    fn end(&self);
}

/// Owned form of every sink operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token { text: String },
    CalledTools { calls: Vec<AgentToolCall> },
    UsedTools { tools: Vec<UsedTool> },
    SourceDocuments { documents: Vec<SourceDocument> },
    Artifacts { artifacts: Vec<Artifact> },
    UsageMetadata { usage: Usage },
    End,
}

/// Callback invoked with each stream event.
pub type StreamEventCallback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Adapts a closure into a [`StreamSink`].
pub struct CallbackSink {
    callback: StreamEventCallback,
}

impl CallbackSink {
    pub fn new(callback: StreamEventCallback) -> Self {
        Self { callback }
    }
}

impl StreamSink for CallbackSink {
    fn token(&self, text: &str) {
        (self.callback)(StreamEvent::Token { text: text.to_string() });
    }
    fn called_tools(&self, calls: &[AgentToolCall]) {
        (self.callback)(StreamEvent::CalledTools { calls: calls.to_vec() });
    }
    fn used_tools(&self, tools: &[UsedTool]) {
        (self.callback)(StreamEvent::UsedTools { tools: tools.to_vec() });
    }
    fn source_documents(&self, documents: &[SourceDocument]) {
        (self.callback)(StreamEvent::SourceDocuments { documents: documents.to_vec() });
    }
    fn artifacts(&self, artifacts: &[Artifact]) {
        (self.callback)(StreamEvent::Artifacts { artifacts: artifacts.to_vec() });
    }
    fn usage_metadata(&self, usage: &Usage) {
        (self.callback)(StreamEvent::UsageMetadata { usage: *usage });
    }
    fn end(&self) {
        (self.callback)(StreamEvent::End);
    }
}

/// Forwards events into an unbounded channel; a closed receiver drops them.
pub struct ChannelSink {
    inner: CallbackSink,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            inner: CallbackSink::new(Arc::new(move |event| {
                let _ = tx.send(event);
            })),
        };
        (sink, rx)
    }
}

impl StreamSink for ChannelSink {
    fn token(&self, text: &str) {
        self.inner.token(text)
    }
    fn called_tools(&self, calls: &[AgentToolCall]) {
        self.inner.called_tools(calls)
    }
    fn used_tools(&self, tools: &[UsedTool]) {
        self.inner.used_tools(tools)
    }
    fn source_documents(&self, documents: &[SourceDocument]) {
        self.inner.source_documents(documents)
    }
    fn artifacts(&self, artifacts: &[Artifact]) {
        self.inner.artifacts(artifacts)
    }
    fn usage_metadata(&self, usage: &Usage) {
        self.inner.usage_metadata(usage)
    }
    fn end(&self) {
        self.inner.end()
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl StreamSink for NoopSink {
    fn token(&self, _text: &str) {}
    fn called_tools(&self, _calls: &[AgentToolCall]) {}
    fn used_tools(&self, _tools: &[UsedTool]) {}
    fn source_documents(&self, _documents: &[SourceDocument]) {}
    fn artifacts(&self, _artifacts: &[Artifact]) {}
    fn usage_metadata(&self, _usage: &Usage) {}
    fn end(&self) {}
}

/// Guards a sink for the duration of one turn.
///
/// Tokens are dropped once the turn has ended, side-channel events go out at
/// most once, and `end` reaches the sink exactly once.
pub struct StreamEmitter {
    sink: Option<Arc<dyn StreamSink>>,
    side_channel_sent: AtomicBool,
    ended: AtomicBool,
}

impl StreamEmitter {
    pub fn new(sink: Option<Arc<dyn StreamSink>>) -> Self {
        Self {
            sink,
            side_channel_sent: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        }
    }

    /// An emitter that forwards nothing.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_active(&self) -> bool {
        self.sink.is_some() && !self.ended.load(Ordering::SeqCst)
    }

    pub fn token(&self, text: &str) {
        if text.is_empty() || !self.is_active() {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.token(text);
        }
    }

    pub fn called_tools(&self, calls: &[AgentToolCall]) {
        if calls.is_empty() || !self.is_active() {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.called_tools(calls);
        }
    }

    /// Emit the turn's tail: side channels, usage, then `end`.
    pub fn finish(
        &self,
        used_tools: &[UsedTool],
        source_documents: &[SourceDocument],
        artifacts: &[Artifact],
        usage: &Usage,
    ) {
        let Some(sink) = &self.sink else {
            return;
        };
        if !self.ended.load(Ordering::SeqCst) && !self.side_channel_sent.swap(true, Ordering::SeqCst) {
            if !used_tools.is_empty() {
                sink.used_tools(used_tools);
            }
            if !source_documents.is_empty() {
                sink.source_documents(source_documents);
            }
            if !artifacts.is_empty() {
                sink.artifacts(artifacts);
            }
            sink.usage_metadata(usage);
        }
        self.end();
    }

    /// Signal the end of the turn; later calls are no-ops.
    pub fn end(&self) {
        let Some(sink) = &self.sink else {
            return;
        };
        if !self.ended.swap(true, Ordering::SeqCst) {
            sink.end();
        }
    }
}

impl std::fmt::Debug for StreamEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEmitter")
            .field("active", &self.is_active())
            .finish()
    }
}
