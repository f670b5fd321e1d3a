//! Inputs and outputs of the tool invocation loop.

use crate::config::{DEFAULT_MAX_TOOL_DEPTH, DEFAULT_STREAM_IDLE_TIMEOUT_MS};
use crate::state::FlowState;
use crate::types::{Artifact, ImageContent, ModelMessage, SourceDocument, Usage, UsedTool};

use super::approvals::{ApprovalCheckpoint, HumanDecision};

/// Per-turn knobs for [`super::ToolLoop`].
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Highest depth allowed; the first model call is depth 0.
    pub max_depth: usize,
    /// Stream model calls, forwarding every chunk's text as a token.
    pub streaming: bool,
    /// This node's output is shown to the user.
    pub visible: bool,
    /// Suspend before tools that require human input.
    pub human_gating: bool,
    /// 0 disables the idle timeout.
    pub stream_idle_timeout_ms: u64,
    pub run_id: String,
    pub chat_id: Option<String>,
    pub flow_state: FlowState,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_TOOL_DEPTH,
            streaming: false,
            visible: false,
            human_gating: true,
            stream_idle_timeout_ms: DEFAULT_STREAM_IDLE_TIMEOUT_MS,
            run_id: String::new(),
            chat_id: None,
            flow_state: FlowState::default(),
        }
    }
}

/// Where a resumed turn picks up: the stored checkpoint and the decision on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub checkpoint: ApprovalCheckpoint,
    pub decision: HumanDecision,
}

/// Result of one loop run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopOutcome {
    pub final_text: String,
    /// Every message exchanged, ending with the final assistant message.
    pub transcript: Vec<ModelMessage>,
    pub used_tools: Vec<UsedTool>,
    pub source_documents: Vec<SourceDocument>,
    pub artifacts: Vec<Artifact>,
    pub usage: Usage,
    /// Inline images carried by the final model response.
    pub images: Vec<ImageContent>,
    /// Depth of the last model call.
    pub depth: usize,
    /// Names of the tools still offered to the model at the end.
    pub available_tools: Vec<String>,
    /// Set when the loop stopped before a gated tool call.
    pub checkpoint: Option<ApprovalCheckpoint>,
}

impl LoopOutcome {
    pub fn is_suspended(&self) -> bool {
        self.checkpoint.is_some()
    }
}
