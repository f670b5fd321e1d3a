//! The agent orchestrator: one entry point per turn.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::config::{AgentConfig, StructuredOutput};
use super::turn::{ConversationContext, TurnEnvironment, TurnInput, TurnResult};
use crate::agent_loop::{
    CheckpointStore, HumanDecision, LoopSettings, ResumePoint, StreamEmitter, ToolLoop,
};
use crate::config::EngineConfig;
use crate::error::FlowError;
use crate::images::{externalize, FileStore, ImageReferenceManager, InlinedImages};
use crate::memory::{MemoryReducer, TurnPrompt};
use crate::provider::{bind_tools, BoundModel, ModelProvider, ProviderRegistry};
use crate::state;
use crate::tools::{Tool, ToolRegistry};
use crate::types::{
    ContentPart, MessageAttachments, ModelMessage, Role, StoredFileRef, Usage,
};

/// A model and tool set already resolved by the caller.
#[derive(Clone)]
pub struct ResolvedAgent {
    pub model: Arc<dyn ModelProvider>,
    pub tools: Vec<Arc<dyn Tool>>,
}

/// Composes memory, images, the tool loop and the state updater into
/// [`AgentOrchestrator::run`].
pub struct AgentOrchestrator {
    providers: ProviderRegistry,
    tools: ToolRegistry,
    files: Arc<dyn FileStore>,
    engine: EngineConfig,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

impl AgentOrchestrator {
    pub fn new(
        providers: ProviderRegistry,
        tools: ToolRegistry,
        files: Arc<dyn FileStore>,
        engine: EngineConfig,
    ) -> Self {
        Self {
            providers,
            tools,
            files,
            engine,
            checkpoints: None,
        }
    }

    /// Save checkpoints on suspension and look them up on resume.
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Run one turn of the node described by `config`.
    pub async fn run(
        &self,
        input: TurnInput,
        context: &ConversationContext,
        config: &AgentConfig,
        env: TurnEnvironment,
    ) -> Result<TurnResult, FlowError> {
        let selector = config
            .model
            .as_ref()
            .ok_or_else(|| FlowError::configuration("no model selected"))?;
        let model = self.providers.create_provider(selector, &config.settings)?;
        let tools = self.tools.resolve(&config.tools)?;
        self.run_resolved(ResolvedAgent { model, tools }, input, context, config, env)
            .await
    }

    /// Run one turn with a model and tools the caller resolved itself.
    ///
    /// `end` reaches the sink exactly once, whether the turn succeeds or fails.
    pub async fn run_resolved(
        &self,
        agent: ResolvedAgent,
        input: TurnInput,
        context: &ConversationContext,
        config: &AgentConfig,
        env: TurnEnvironment,
    ) -> Result<TurnResult, FlowError> {
        let emitter = StreamEmitter::new(if env.is_last_node {
            env.sink.clone()
        } else {
            None
        });
        let run_id = uuid::Uuid::new_v4().to_string();
        let result = self
            .execute(agent, input, context, config, &env, &emitter, &run_id)
            .await;
        if let Err(err) = &result {
            if err.is_cancellation() {
                tracing::debug!(run_id = %run_id, "turn canceled");
            } else {
                tracing::warn!(run_id = %run_id, error = %err, category = %err.category(), "turn failed");
            }
            emitter.end();
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        agent: ResolvedAgent,
        input: TurnInput,
        context: &ConversationContext,
        config: &AgentConfig,
        env: &TurnEnvironment,
        emitter: &StreamEmitter,
        run_id: &str,
    ) -> Result<TurnResult, FlowError> {
        let started_at = Utc::now();
        if env.cancel.is_cancelled() {
            return Err(FlowError::Canceled);
        }
        let max_depth = config.max_tool_depth.unwrap_or(self.engine.max_tool_depth);
        if max_depth == 0 {
            return Err(FlowError::configuration("max_tool_depth must be at least 1"));
        }
        let chat_id = env.chat_id.as_deref();
        let resume = self.resume_point(&input, chat_id, &config.label).await?;

        let ResolvedAgent { model, tools } = agent;
        let bound = bind_tools(model.clone(), &tools)?.with_settings(config.settings.clone());
        let capabilities = model.capabilities().clone();
        if config.structured_output.is_some() && !capabilities.supports_json_schema {
            return Err(FlowError::configuration(format!(
                "model {} does not support structured output",
                model.model_id()
            )));
        }

        tracing::debug!(
            run_id = %run_id,
            label = %config.label,
            strategy = config.memory.strategy.name(),
            tools = tools.len(),
            resuming = resume.is_some(),
            "starting turn"
        );

        let mut usage = Usage::default();
        let prompt = match &resume {
            Some(resume) => resume.checkpoint.transcript.clone(),
            None => {
                let mut reducer = MemoryReducer::new(model.clone())
                    .with_default_token_limit(self.engine.summary_buffer_token_limit);
                if let Some(template) = &self.engine.summary_prompt {
                    reducer = reducer.with_summary_prompt(template.clone());
                }
                let reduced = reducer
                    .reduce(
                        &context.past_history,
                        &context.runtime_history,
                        TurnPrompt {
                            input: &input.text,
                            uploads: &input.uploads,
                        },
                        &config.memory,
                        env.cancel.clone(),
                    )
                    .await?;
                usage.merge(&reduced.usage);
                let mut messages = config.ordered_messages();
                messages.extend(reduced.messages);
                messages
            }
        };

        let images = ImageReferenceManager::new(self.files.clone())
            .with_detail(self.engine.image_detail.clone());
        let inlined = if capabilities.supports_vision {
            images.inline(&prompt, &input.uploads, chat_id).await?
        } else {
            InlinedImages {
                messages: prompt,
                ledger: Default::default(),
            }
        };

        let plain_output = config.structured_output.is_none();
        let settings = LoopSettings {
            max_depth,
            streaming: config.streaming
                && capabilities.supports_streaming
                && env.is_last_node
                && plain_output
                && env.sink.is_some(),
            visible: env.is_last_node && plain_output,
            human_gating: !env.in_iteration(),
            stream_idle_timeout_ms: self.engine.stream_idle_timeout_ms,
            run_id: run_id.to_string(),
            chat_id: env.chat_id.clone(),
            flow_state: context.flow_state.clone(),
        };
        let tool_loop = ToolLoop::new(bound.clone(), tools, settings);
        let is_resume = resume.is_some();
        let outcome = tool_loop
            .invoke(inlined.messages, resume, emitter, &env.cancel)
            .await?;
        usage.merge(&outcome.usage);

        let mut final_text = outcome.final_text.clone();
        let mut state_output = final_text.clone();
        if let (Some(structured), false) = (&config.structured_output, outcome.is_suspended()) {
            let (value, structured_usage) =
                structure_answer(&bound, structured, &final_text, &env.cancel).await?;
            usage.merge(&structured_usage);
            let pretty = serde_json::to_string_pretty(&value)?;
            final_text = format!("```json\n{pretty}\n```");
            state_output = value.to_string();
            if env.is_last_node {
                emitter.token(&final_text);
            }
        }

        let updated_flow_state = if outcome.is_suspended() {
            context.flow_state.clone()
        } else {
            state::apply(&context.flow_state, &config.update_state, &state_output)
        };

        let (generated_refs, generated_artifacts) = images
            .persist_generated_images(&outcome.images, chat_id)
            .await?;
        let mut artifacts = outcome.artifacts.clone();
        artifacts.extend(generated_artifacts);

        let messages = externalize(&outcome.transcript, &inlined.ledger);
        let checkpoint = outcome.checkpoint.clone().map(|mut checkpoint| {
            checkpoint.transcript = externalize(&checkpoint.transcript, &inlined.ledger);
            checkpoint
        });
        if let (Some(store), Some(checkpoint)) = (&self.checkpoints, &checkpoint) {
            store
                .save(&checkpoint_key(chat_id, &config.label), checkpoint.clone())
                .await?;
        }

        let mut chat_history_delta = Vec::new();
        if context.is_first_node() && !is_resume {
            if !input.uploads.is_empty() {
                chat_history_delta.push(file_ref_message(&input.uploads));
            }
            if !input.text.is_empty() {
                chat_history_delta.push(ModelMessage::user(input.text.clone()));
            }
        }
        let mut content = vec![ContentPart::text(final_text.clone())];
        content.extend(generated_refs.into_iter().map(ContentPart::FileRef));
        chat_history_delta.push(
            ModelMessage::from_parts(config.return_response_as.into(), content)
                .with_name(config.label.clone())
                .with_attachments(MessageAttachments {
                    used_tools: outcome.used_tools.clone(),
                    artifacts: artifacts.clone(),
                    file_annotations: Vec::new(),
                    source_documents: outcome.source_documents.clone(),
                }),
        );

        emitter.finish(&outcome.used_tools, &outcome.source_documents, &artifacts, &usage);

        tracing::debug!(
            run_id = %run_id,
            depth = outcome.depth,
            used_tools = outcome.used_tools.len(),
            waiting = outcome.is_suspended(),
            total_tokens = usage.total_tokens,
            "turn complete"
        );

        Ok(TurnResult {
            run_id: run_id.to_string(),
            final_text,
            used_tools: outcome.used_tools,
            source_documents: outcome.source_documents,
            artifacts,
            usage,
            is_waiting_for_human_input: checkpoint.is_some(),
            checkpoint,
            updated_flow_state,
            chat_history_delta,
            messages,
            available_tools: outcome.available_tools,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn resume_point(
        &self,
        input: &TurnInput,
        chat_id: Option<&str>,
        label: &str,
    ) -> Result<Option<ResumePoint>, FlowError> {
        let Some(raw) = &input.human_input else {
            return Ok(None);
        };
        let decision = HumanDecision::parse(raw)?;
        let checkpoint = match (&input.checkpoint, &self.checkpoints) {
            (Some(checkpoint), _) => Some(checkpoint.clone()),
            (None, Some(store)) => store.take(&checkpoint_key(chat_id, label)).await?,
            (None, None) => None,
        };
        let checkpoint = checkpoint.ok_or_else(|| {
            FlowError::configuration("human input decision received without a checkpoint to resume")
        })?;
        Ok(Some(ResumePoint {
            checkpoint,
            decision,
        }))
    }
}

impl std::fmt::Debug for AgentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOrchestrator")
            .field("providers", &self.providers.provider_keys())
            .field("engine", &self.engine)
            .field("checkpoints", &self.checkpoints.is_some())
            .finish()
    }
}

/// Key under which a node's suspended turn is stored.
pub fn checkpoint_key(chat_id: Option<&str>, label: &str) -> String {
    format!("{}:{label}", chat_id.unwrap_or("default"))
}

fn file_ref_message(uploads: &[StoredFileRef]) -> ModelMessage {
    ModelMessage::from_parts(
        Role::User,
        uploads.iter().cloned().map(ContentPart::FileRef).collect(),
    )
}

/// Convert a free-text answer into the configured JSON schema.
async fn structure_answer(
    model: &BoundModel,
    structured: &StructuredOutput,
    answer: &str,
    cancel: &CancellationToken,
) -> Result<(serde_json::Value, Usage), FlowError> {
    let prompts = [ModelMessage::user(format!(
        "Convert the following response to the structured output format: {answer}"
    ))];
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(FlowError::Canceled),
        response = model.invoke_structured(&prompts, structured.response_format(), cancel.child_token()) => response?,
    };
    let value = serde_json::from_str(strip_json_fence(&response.text))?;
    Ok((value, response.usage))
}

fn strip_json_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fenced_json_is_unwrapped() {
        assert_eq!(strip_json_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fence(" {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn checkpoint_keys_are_scoped_by_chat() {
        assert_eq!(checkpoint_key(Some("c1"), "agent"), "c1:agent");
        assert_eq!(checkpoint_key(None, "agent"), "default:agent");
    }
}
