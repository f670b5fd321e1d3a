use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent_loop::markers::split_side_channels;
use crate::error::FlowError;
use crate::tools::{Tool, ToolArguments, ToolExecutionContext};
use crate::types::{
    AgentToolCall, Artifact, MessageAttachments, ModelMessage, SourceDocument, UsedTool,
};

use super::super::types::LoopSettings;

/// What one tool call contributed to the turn.
#[derive(Debug, Clone)]
pub(super) struct ToolExecutionOutcome {
    pub(super) message: ModelMessage,
    pub(super) used_tool: UsedTool,
    pub(super) source_documents: Vec<SourceDocument>,
    pub(super) artifacts: Vec<Artifact>,
}

impl ToolExecutionOutcome {
    pub(super) fn failed(&self) -> bool {
        self.used_tool.error.is_some()
    }
}

pub(super) fn find_tool<'a>(tools: &'a [Arc<dyn Tool>], name: &str) -> Option<&'a Arc<dyn Tool>> {
    tools.iter().find(|tool| tool.name() == name)
}

/// Run one tool call.
///
/// A failing tool is recorded, not raised: the outcome carries the error on
/// its used-tool entry and an error `tool` message answering the call. Only
/// cancellation is returned as `Err`.
pub(super) async fn execute_tool_call(
    tool: &Arc<dyn Tool>,
    call: &AgentToolCall,
    settings: &LoopSettings,
    cancel: &CancellationToken,
) -> Result<ToolExecutionOutcome, FlowError> {
    let args = ToolArguments::new(call.arguments.clone());
    let ctx = ToolExecutionContext {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        chat_id: settings.chat_id.clone(),
        flow_state: settings.flow_state.clone(),
        cancel: cancel.child_token(),
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FlowError::Canceled),
        result = tool.execute(&args, &ctx) => result,
    };

    match result {
        Ok(value) => Ok(completed(call, value)),
        Err(err) if err.is_cancellation() => {
            tracing::debug!(tool_name = %call.name, tool_call_id = %call.id, "tool call canceled");
            Err(err)
        }
        Err(err) => {
            tracing::warn!(
                run_id = %settings.run_id,
                tool_name = %call.name,
                tool_call_id = %call.id,
                error = %err,
                "tool call failed"
            );
            Ok(failed(call, err))
        }
    }
}

fn completed(call: &AgentToolCall, value: serde_json::Value) -> ToolExecutionOutcome {
    let (output, source_documents, artifacts, tool_input) = match value {
        serde_json::Value::String(raw) => {
            let channels = split_side_channels(&raw);
            (
                serde_json::Value::String(channels.output),
                channels.source_documents,
                channels.artifacts,
                channels.tool_args,
            )
        }
        structured => (structured, Vec::new(), Vec::new(), None),
    };

    let message = ModelMessage::tool_result(call.id.clone(), call.name.clone(), output.clone(), false)
        .with_attachments(MessageAttachments {
            artifacts: artifacts.clone(),
            source_documents: source_documents.clone(),
            ..Default::default()
        });
    ToolExecutionOutcome {
        message,
        used_tool: UsedTool {
            tool: call.name.clone(),
            tool_input: tool_input.unwrap_or_else(|| call.arguments.clone()),
            tool_output: output,
            error: None,
        },
        source_documents,
        artifacts,
    }
}

fn failed(call: &AgentToolCall, err: FlowError) -> ToolExecutionOutcome {
    let error = match err {
        FlowError::ToolExecution { message, .. } => message,
        other => other.to_string(),
    };
    ToolExecutionOutcome {
        message: ModelMessage::tool_result(
            call.id.clone(),
            call.name.clone(),
            serde_json::json!({ "error": error }),
            true,
        ),
        used_tool: UsedTool {
            tool: call.name.clone(),
            tool_input: call.arguments.clone(),
            tool_output: serde_json::Value::String(String::new()),
            error: Some(error),
        },
        source_documents: Vec::new(),
        artifacts: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_loop::markers::SOURCE_DOCUMENTS_MARKER;
    use crate::tools::{AgentTool, AgentToolParameters};
    use crate::types::ContentPart;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn call(name: &str) -> AgentToolCall {
        AgentToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments: json!({"city": "Paris"}),
        }
    }

    #[tokio::test]
    async fn successful_call_strips_side_channels() {
        let tool: Arc<dyn Tool> = Arc::new(AgentTool::new(
            "search",
            "Search",
            AgentToolParameters::empty(),
            |_args, _ctx| async move {
                Ok(json!(format!("two hits{SOURCE_DOCUMENTS_MARKER}[{{\"id\":1}},{{\"id\":2}}]")))
            },
        ));
        let outcome = execute_tool_call(&tool, &call("search"), &LoopSettings::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.failed());
        assert_eq!(outcome.used_tool.tool_output, json!("two hits"));
        assert_eq!(outcome.source_documents, vec![json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(outcome.message.tool_call_id(), Some("call_1"));
    }

    #[tokio::test]
    async fn failing_call_is_recorded_with_error_message() {
        let tool: Arc<dyn Tool> = Arc::new(AgentTool::new(
            "get_weather",
            "Weather",
            AgentToolParameters::empty(),
            |_args, _ctx| async move { Err(FlowError::tool("get_weather", "upstream 503")) },
        ));
        let outcome = execute_tool_call(&tool, &call("get_weather"), &LoopSettings::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.failed());
        assert_eq!(outcome.used_tool.error.as_deref(), Some("upstream 503"));
        let ContentPart::ToolResult(result) = &outcome.message.content[0] else {
            panic!("expected a tool result");
        };
        assert!(result.is_error);
        assert_eq!(result.result, json!({"error": "upstream 503"}));
    }

    #[tokio::test]
    async fn cancellation_is_propagated() {
        let tool: Arc<dyn Tool> = Arc::new(AgentTool::new(
            "slow",
            "Slow",
            AgentToolParameters::empty(),
            |_args, _ctx| async move {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok(json!("done"))
            },
        ));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = execute_tool_call(&tool, &call("slow"), &LoopSettings::default(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }
}
