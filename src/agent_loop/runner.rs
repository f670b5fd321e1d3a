//! The tool invocation loop.
//!
//! One loop serves fresh turns and turns resumed after a human decision: a
//! [`ResumePoint`] replays the suspended batch first, then both paths share
//! the same model/tool cycle.

mod llm_phase;
mod tooling;

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::FlowError;
use crate::provider::BoundModel;
use crate::tools::Tool;
use crate::types::{
    AgentToolCall, Artifact, ContentPart, ImageContent, ModelMessage, SourceDocument, Usage,
    UsedTool,
};

use super::approvals::{ApprovalCheckpoint, DecisionType};
use super::events::StreamEmitter;
use super::types::{LoopOutcome, LoopSettings, ResumePoint};
use llm_phase::{run_llm_phase, LlmPhaseArgs};
use tooling::{execute_tool_call, find_tool, ToolExecutionOutcome};

/// Drives model calls and tool batches until the model answers without
/// calling a tool.
pub struct ToolLoop {
    model: BoundModel,
    tools: Vec<Arc<dyn Tool>>,
    settings: LoopSettings,
}

struct LoopState {
    model: BoundModel,
    tools: Vec<Arc<dyn Tool>>,
    messages: Vec<ModelMessage>,
    used_tools: Vec<UsedTool>,
    source_documents: Vec<SourceDocument>,
    artifacts: Vec<Artifact>,
    usage: Usage,
    depth: usize,
}

impl LoopState {
    fn absorb(&mut self, outcome: ToolExecutionOutcome) {
        self.messages.push(outcome.message);
        self.used_tools.push(outcome.used_tool);
        self.source_documents.extend(outcome.source_documents);
        self.artifacts.extend(outcome.artifacts);
    }

    fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_string()).collect()
    }

    fn finish(mut self, final_text: String, images: Vec<ImageContent>) -> LoopOutcome {
        self.messages.push(ModelMessage::assistant(final_text.clone()));
        LoopOutcome {
            final_text,
            available_tools: self.tool_names(),
            transcript: self.messages,
            used_tools: self.used_tools,
            source_documents: self.source_documents,
            artifacts: self.artifacts,
            usage: self.usage,
            images,
            depth: self.depth,
            checkpoint: None,
        }
    }
}

enum BatchOutcome {
    Completed { direct: Option<String> },
    Suspended { index: usize, call: AgentToolCall },
}

/// A batch that already ran (or stopped) before the next model call.
struct BatchStep {
    outcome: BatchOutcome,
    /// Text of the assistant message that issued the batch.
    text: String,
    /// The batch text has not been shown to the user yet.
    text_unseen: bool,
}

impl ToolLoop {
    pub fn new(model: BoundModel, tools: Vec<Arc<dyn Tool>>, settings: LoopSettings) -> Self {
        Self {
            model,
            tools,
            settings,
        }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run the loop over `messages`.
    ///
    /// When resuming, `messages` is the checkpoint transcript (images may have
    /// been re-inlined by the caller) and the decision is applied to the
    /// pending call before the model is called again.
    pub async fn invoke(
        &self,
        messages: Vec<ModelMessage>,
        resume: Option<ResumePoint>,
        emitter: &StreamEmitter,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, FlowError> {
        let mut state = LoopState {
            model: self.model.clone(),
            tools: self.tools.clone(),
            messages,
            used_tools: Vec::new(),
            source_documents: Vec::new(),
            artifacts: Vec::new(),
            usage: Usage::default(),
            depth: 0,
        };

        let mut pending = match resume {
            Some(resume) => Some(self.resume(&mut state, resume, cancel).await?),
            None => None,
        };

        loop {
            let step = match pending.take() {
                Some(step) => step,
                None => {
                    if state.depth > self.settings.max_depth {
                        return Err(FlowError::RecursionLimit {
                            depth: self.settings.max_depth,
                        });
                    }
                    let response = run_llm_phase(LlmPhaseArgs {
                        model: &state.model,
                        messages: &state.messages,
                        emitter,
                        settings: &self.settings,
                        cancel,
                        depth: state.depth,
                    })
                    .await?;
                    state.usage.merge(&response.usage);

                    let (calls, unanswerable): (Vec<_>, Vec<_>) = response
                        .tool_calls
                        .iter()
                        .cloned()
                        .partition(|call| !call.id.is_empty());
                    for call in unanswerable {
                        state.used_tools.push(UsedTool {
                            tool: call.name,
                            tool_input: call.arguments,
                            tool_output: serde_json::Value::String(response.text.clone()),
                            error: None,
                        });
                    }

                    if calls.is_empty() {
                        if self.settings.visible && !self.settings.streaming {
                            emitter.token(&response.text);
                        }
                        return Ok(state.finish(response.text, response.images));
                    }

                    emitter.called_tools(&calls);
                    state.messages.push(ModelMessage::assistant_with_tool_calls(
                        response.text.clone(),
                        calls.clone(),
                    ));
                    BatchStep {
                        outcome: self.run_batch(&mut state, &calls, 0, None, cancel).await?,
                        text: response.text,
                        text_unseen: !self.settings.streaming,
                    }
                }
            };

            match step.outcome {
                BatchOutcome::Suspended { index, call } => {
                    return Ok(self.suspend(state, step.text, step.text_unseen, index, call, emitter));
                }
                BatchOutcome::Completed {
                    direct: Some(output),
                } => {
                    if self.settings.visible {
                        emitter.token(&output);
                    }
                    return Ok(state.finish(output, Vec::new()));
                }
                BatchOutcome::Completed { direct: None } => state.depth += 1,
            }
        }
    }

    /// Execute `calls[start..]` in order.
    ///
    /// Stops before the first gated tool unless it is the approved call.
    /// Unknown tool names are skipped.
    async fn run_batch(
        &self,
        state: &mut LoopState,
        calls: &[AgentToolCall],
        start: usize,
        approved: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, FlowError> {
        let mut direct = None;
        for (index, call) in calls.iter().enumerate().skip(start) {
            if cancel.is_cancelled() {
                return Err(FlowError::Canceled);
            }
            let Some(tool) = find_tool(&state.tools, &call.name).cloned() else {
                tracing::debug!(
                    run_id = %self.settings.run_id,
                    tool_name = %call.name,
                    tool_call_id = %call.id,
                    "skipping call to unknown tool"
                );
                continue;
            };
            if self.settings.human_gating
                && tool.requires_human_input()
                && approved != Some(call.id.as_str())
            {
                tracing::debug!(
                    run_id = %self.settings.run_id,
                    tool_name = %call.name,
                    tool_call_id = %call.id,
                    "suspending for human input"
                );
                return Ok(BatchOutcome::Suspended {
                    index,
                    call: call.clone(),
                });
            }

            let outcome = execute_tool_call(&tool, call, &self.settings, cancel).await?;
            if calls.len() == 1 && tool.returns_direct() && !outcome.failed() {
                direct = Some(outcome.used_tool.output_text());
            }
            state.absorb(outcome);
        }
        Ok(BatchOutcome::Completed { direct })
    }

    async fn resume(
        &self,
        state: &mut LoopState,
        resume: ResumePoint,
        cancel: &CancellationToken,
    ) -> Result<BatchStep, FlowError> {
        let ResumePoint {
            checkpoint,
            decision,
        } = resume;
        let batch = checkpoint.batch();
        if batch.is_empty() {
            return Err(FlowError::InvalidState(format!(
                "checkpoint transcript has no assistant message issuing tool call '{}'",
                checkpoint.tool_call.id
            )));
        }
        let index = batch
            .iter()
            .position(|call| call.id == checkpoint.tool_call.id)
            .unwrap_or(checkpoint.tool_call_index);
        state.used_tools = checkpoint.used_tools;
        state.source_documents = checkpoint.source_documents;
        state.artifacts = checkpoint.artifacts;
        state.usage = checkpoint.usage;
        state.depth = checkpoint.depth;
        if !checkpoint.available_tools.is_empty() {
            state
                .tools
                .retain(|tool| checkpoint.available_tools.iter().any(|name| name == tool.name()));
            state.model = state.model.rebind(&state.tools);
        }

        let pending = checkpoint.tool_call;
        let batch_at = state
            .messages
            .iter()
            .rposition(|message| message.tool_calls().iter().any(|call| call.id == pending.id))
            .ok_or_else(|| {
                FlowError::InvalidState(format!(
                    "resumed transcript lost the assistant message issuing tool call '{}'",
                    pending.id
                ))
            })?;
        let text = state.messages[batch_at].text();

        tracing::debug!(
            run_id = %self.settings.run_id,
            tool_name = %pending.name,
            tool_call_id = %pending.id,
            decision = %decision.decision,
            "resuming suspended turn"
        );

        let outcome = match decision.decision {
            DecisionType::Proceed => {
                self.run_batch(state, &batch, index, Some(pending.id.as_str()), cancel)
                    .await?
            }
            DecisionType::Reject => {
                if batch.len() == 1 {
                    state.messages.remove(batch_at);
                } else {
                    state.messages[batch_at].content.retain(
                        |part| !matches!(part, ContentPart::ToolCall(call) if call.id == pending.id),
                    );
                }
                self.drop_rejected_tool(state, &pending.name);
                let remaining: Vec<AgentToolCall> =
                    batch.into_iter().filter(|call| call.id != pending.id).collect();
                let outcome = self.run_batch(state, &remaining, index, None, cancel).await?;
                if let (BatchOutcome::Completed { .. }, Some(feedback)) =
                    (&outcome, decision.feedback_text())
                {
                    state.messages.push(ModelMessage::user(feedback));
                }
                outcome
            }
        };

        Ok(BatchStep {
            outcome,
            text,
            text_unseen: false,
        })
    }

    /// Remove a rejected tool, and every tool sharing its group, for the rest
    /// of the turn.
    fn drop_rejected_tool(&self, state: &mut LoopState, name: &str) {
        let group = find_tool(&state.tools, name).and_then(|tool| tool.group().map(str::to_string));
        state.tools.retain(|tool| {
            let same_group = group.is_some() && tool.group() == group.as_deref();
            tool.name() != name && !same_group
        });
        state.model = state.model.rebind(&state.tools);
    }

    fn suspend(
        &self,
        state: LoopState,
        text: String,
        text_unseen: bool,
        index: usize,
        call: AgentToolCall,
        emitter: &StreamEmitter,
    ) -> LoopOutcome {
        let details = serde_json::to_string_pretty(&call).unwrap_or_else(|_| call.name.clone());
        let notice = format!("\nAttempting to use tool:\n```json\n{details}\n```");
        let final_text = format!("{text}{notice}");
        if self.settings.visible {
            emitter.token(if text_unseen { &final_text } else { &notice });
        }

        let checkpoint = ApprovalCheckpoint {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            transcript: state.messages.clone(),
            tool_call_index: index,
            tool_call: call,
            depth: state.depth,
            used_tools: state.used_tools.clone(),
            source_documents: state.source_documents.clone(),
            artifacts: state.artifacts.clone(),
            usage: state.usage,
            available_tools: state.tool_names(),
        };
        LoopOutcome {
            final_text,
            available_tools: checkpoint.available_tools.clone(),
            transcript: state.messages,
            used_tools: state.used_tools,
            source_documents: state.source_documents,
            artifacts: state.artifacts,
            usage: state.usage,
            images: Vec::new(),
            depth: state.depth,
            checkpoint: Some(checkpoint),
        }
    }
}

impl std::fmt::Debug for ToolLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolLoop")
            .field("model", &self.model)
            .field("tools", &self.tools.iter().map(|tool| tool.name()).collect::<Vec<_>>())
            .field("settings", &self.settings)
            .finish()
    }
}
