//! Tool trait, closure-based tool wrapper, and the human-gating wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use super::types::{AgentToolParameters, ToolDescriptor};
use crate::error::FlowError;
use crate::state::FlowState;

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    /// Tool call id as issued by the model.
    pub tool_call_id: String,
    /// Tool name as requested by the model.
    pub tool_name: String,
    /// Chat the turn belongs to.
    pub chat_id: Option<String>,
    /// Flow state as it stood when the turn started.
    pub flow_state: FlowState,
    /// Fires when the turn is aborted.
    pub cancel: CancellationToken,
}

/// Core tool trait. Implement to expose a callable capability to the model.
///
/// Output is either a JSON string (plain text) or any structured value.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &AgentToolParameters;

    /// Execution must wait for a human proceed/reject decision.
    fn requires_human_input(&self) -> bool {
        false
    }

    /// Output is used verbatim as the turn's answer.
    fn returns_direct(&self) -> bool {
        false
    }

    /// Tools sharing a group are removed together when one of them is rejected.
    fn group(&self) -> Option<&str> {
        None
    }

    /// Execute the tool with parsed arguments.
    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, FlowError>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters().schema.clone(),
            requires_human_input: self.requires_human_input(),
            returns_direct: self.returns_direct(),
        }
    }
}

type ToolHandler = dyn Fn(
        ToolArguments,
        ToolExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, FlowError>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for quick tool creation.
pub struct AgentTool {
    name: String,
    description: String,
    parameters: AgentToolParameters,
    requires_human_input: bool,
    returns_direct: bool,
    handler: Arc<ToolHandler>,
}

impl AgentTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: AgentToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, FlowError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            requires_human_input: false,
            returns_direct: false,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }

    pub fn requiring_human_input(mut self) -> Self {
        self.requires_human_input = true;
        self
    }

    pub fn returning_direct(mut self) -> Self {
        self.returns_direct = true;
        self
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    fn requires_human_input(&self) -> bool {
        self.requires_human_input
    }

    fn returns_direct(&self) -> bool {
        self.returns_direct
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, FlowError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("requires_human_input", &self.requires_human_input)
            .field("returns_direct", &self.returns_direct)
            .finish()
    }
}

/// Wraps a registry-produced tool with the node's selection settings.
pub struct HumanGatedTool {
    inner: Arc<dyn Tool>,
    group: String,
    requires_human_input: bool,
}

impl HumanGatedTool {
    pub fn new(inner: Arc<dyn Tool>, group: impl Into<String>, requires_human_input: bool) -> Self {
        Self {
            inner,
            group: group.into(),
            requires_human_input,
        }
    }
}

#[async_trait]
impl Tool for HumanGatedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters(&self) -> &AgentToolParameters {
        self.inner.parameters()
    }

    fn requires_human_input(&self) -> bool {
        self.requires_human_input || self.inner.requires_human_input()
    }

    fn returns_direct(&self) -> bool {
        self.inner.returns_direct()
    }

    fn group(&self) -> Option<&str> {
        Some(&self.group)
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, FlowError> {
        self.inner.execute(args, ctx).await
    }
}
