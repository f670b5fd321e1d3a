//! What goes into a turn and what comes out of it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agent_loop::{ApprovalCheckpoint, StreamSink};
use crate::state::FlowState;
use crate::types::{Artifact, ModelMessage, SourceDocument, StoredFileRef, Usage, UsedTool};

/// The new material for one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnInput {
    pub text: String,
    /// Files uploaded with this turn.
    pub uploads: Vec<StoredFileRef>,
    /// Raw human decision: `"proceed"`, `"reject"` or `{"type", "feedback"}`.
    pub human_input: Option<serde_json::Value>,
    /// Checkpoint the decision applies to, when the caller persisted it.
    pub checkpoint: Option<ApprovalCheckpoint>,
}

impl TurnInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// A resume turn carrying a decision on `checkpoint`.
    pub fn decision(human_input: serde_json::Value, checkpoint: Option<ApprovalCheckpoint>) -> Self {
        Self {
            human_input: Some(human_input),
            checkpoint,
            ..Default::default()
        }
    }

    pub fn with_uploads(mut self, uploads: Vec<StoredFileRef>) -> Self {
        self.uploads = uploads;
        self
    }
}

/// Conversation state the caller threads into a turn. Never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Previously persisted chat history.
    pub past_history: Vec<ModelMessage>,
    /// Messages produced earlier in the same flow run.
    pub runtime_history: Vec<ModelMessage>,
    pub flow_state: FlowState,
}

impl ConversationContext {
    /// Whether this node is the first to run in the flow.
    pub fn is_first_node(&self) -> bool {
        self.runtime_history.is_empty()
    }
}

/// Where the turn runs: chat, position in the flow, sink, abort signal.
#[derive(Clone, Default)]
pub struct TurnEnvironment {
    pub chat_id: Option<String>,
    /// The node's output is the flow's user-visible answer.
    pub is_last_node: bool,
    pub sink: Option<Arc<dyn StreamSink>>,
    pub cancel: CancellationToken,
    /// Set when the node runs inside an iteration; disables human gating.
    pub iteration_context: Option<serde_json::Value>,
}

impl TurnEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// Mark the node as the visible terminal node, streaming into `sink`.
    pub fn last_node(mut self, sink: Option<Arc<dyn StreamSink>>) -> Self {
        self.is_last_node = true;
        self.sink = sink;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_iteration_context(mut self, context: serde_json::Value) -> Self {
        self.iteration_context = Some(context);
        self
    }

    pub(crate) fn in_iteration(&self) -> bool {
        match &self.iteration_context {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Object(map)) => !map.is_empty(),
            Some(_) => true,
        }
    }
}

impl std::fmt::Debug for TurnEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnEnvironment")
            .field("chat_id", &self.chat_id)
            .field("is_last_node", &self.is_last_node)
            .field("has_sink", &self.sink.is_some())
            .field("canceled", &self.cancel.is_cancelled())
            .field("iteration_context", &self.iteration_context)
            .finish()
    }
}

/// Everything a turn produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub run_id: String,
    pub final_text: String,
    pub used_tools: Vec<UsedTool>,
    pub source_documents: Vec<SourceDocument>,
    pub artifacts: Vec<Artifact>,
    pub usage: Usage,
    pub is_waiting_for_human_input: bool,
    /// Persist this to resume after a human decision.
    pub checkpoint: Option<ApprovalCheckpoint>,
    /// Replaces the flow's state map for the next node.
    pub updated_flow_state: FlowState,
    /// The only messages to append to durable chat history.
    pub chat_history_delta: Vec<ModelMessage>,
    /// Full externalized transcript of the turn.
    pub messages: Vec<ModelMessage>,
    pub available_tools: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_iteration_context_keeps_gating() {
        assert!(!TurnEnvironment::new().in_iteration());
        assert!(!TurnEnvironment::new().with_iteration_context(json!({})).in_iteration());
        assert!(TurnEnvironment::new()
            .with_iteration_context(json!({"index": 0}))
            .in_iteration());
    }
}
