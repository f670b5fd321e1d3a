//! Human approval: decisions, checkpoints, and checkpoint storage.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::Mutex;

use crate::error::FlowError;
use crate::types::{AgentToolCall, Artifact, ModelMessage, SourceDocument, Usage, UsedTool};

/// Outcome a human chose for a pending tool call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecisionType {
    Proceed,
    Reject,
}

/// A decision plus optional free-text feedback for the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HumanDecision {
    #[serde(rename = "type")]
    pub decision: DecisionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl HumanDecision {
    pub fn proceed() -> Self {
        Self {
            decision: DecisionType::Proceed,
            feedback: None,
        }
    }

    pub fn reject(feedback: Option<String>) -> Self {
        Self {
            decision: DecisionType::Reject,
            feedback,
        }
    }

    /// Parse a decision payload.
    ///
    /// Accepts the bare strings `"proceed"` / `"reject"` or an object
    /// `{"type": ..., "feedback": ...}`. Anything else is rejected.
    pub fn parse(value: &serde_json::Value) -> Result<Self, FlowError> {
        match value {
            serde_json::Value::String(raw) => raw.parse(),
            serde_json::Value::Object(map) => {
                let raw_type = map.get("type").ok_or_else(|| {
                    FlowError::InvalidDecision("decision object is missing 'type'".into())
                })?;
                let decision = raw_type
                    .as_str()
                    .and_then(|raw| raw.parse::<DecisionType>().ok())
                    .ok_or_else(|| invalid_decision(raw_type))?;
                let feedback = match map.get("feedback") {
                    None | Some(serde_json::Value::Null) => None,
                    Some(serde_json::Value::String(text)) => Some(text.clone()),
                    Some(other) => {
                        return Err(FlowError::InvalidDecision(format!(
                            "feedback must be a string, got {other}"
                        )))
                    }
                };
                Ok(Self { decision, feedback })
            }
            other => Err(invalid_decision(other)),
        }
    }

    /// Feedback worth forwarding to the model.
    pub fn feedback_text(&self) -> Option<&str> {
        self.feedback
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

impl std::str::FromStr for HumanDecision {
    type Err = FlowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let decision = raw
            .parse::<DecisionType>()
            .map_err(|_| invalid_decision(&serde_json::Value::String(raw.to_string())))?;
        Ok(Self {
            decision,
            feedback: None,
        })
    }
}

fn invalid_decision(value: &serde_json::Value) -> FlowError {
    FlowError::InvalidDecision(format!(
        "expected \"proceed\" or \"reject\", got {value}"
    ))
}

/// Everything needed to resume a turn suspended before a gated tool call.
///
/// `transcript` ends with the assistant message carrying the pending batch,
/// followed by the results of calls that already ran in that batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalCheckpoint {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub transcript: Vec<ModelMessage>,
    pub tool_call_index: usize,
    pub tool_call: AgentToolCall,
    /// Model invocations already spent in the suspended turn.
    #[serde(default)]
    pub depth: usize,
    #[serde(default)]
    pub used_tools: Vec<UsedTool>,
    #[serde(default)]
    pub source_documents: Vec<SourceDocument>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub usage: Usage,
    /// Names of the tools still offered to the model when the turn stopped.
    #[serde(default)]
    pub available_tools: Vec<String>,
}

impl ApprovalCheckpoint {
    /// Index of the assistant message holding the pending call.
    pub fn batch_message_index(&self) -> Option<usize> {
        self.transcript.iter().rposition(|message| {
            message
                .tool_calls()
                .iter()
                .any(|call| call.id == self.tool_call.id)
        })
    }

    /// Calls of the pending batch, in the order the model emitted them.
    pub fn batch(&self) -> Vec<AgentToolCall> {
        self.batch_message_index()
            .map(|index| {
                self.transcript[index]
                    .tool_calls()
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// External persistence for suspended turns.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, key: &str, checkpoint: ApprovalCheckpoint) -> Result<(), FlowError>;

    /// Remove and return the checkpoint stored under `key`.
    async fn take(&self, key: &str) -> Result<Option<ApprovalCheckpoint>, FlowError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, ApprovalCheckpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, key: &str, checkpoint: ApprovalCheckpoint) -> Result<(), FlowError> {
        self.checkpoints
            .lock()
            .await
            .insert(key.to_string(), checkpoint);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<ApprovalCheckpoint>, FlowError> {
        Ok(self.checkpoints.lock().await.remove(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_bare_and_object_decisions() {
        assert_eq!(HumanDecision::parse(&json!("proceed")).unwrap(), HumanDecision::proceed());
        assert_eq!(
            HumanDecision::parse(&json!({"type": "reject", "feedback": "use the staging db"})).unwrap(),
            HumanDecision::reject(Some("use the staging db".into()))
        );
    }

    #[test]
    fn anything_else_is_an_invalid_decision() {
        for value in [json!("approve"), json!("Proceed"), json!(true), json!({"feedback": "x"})] {
            let err = HumanDecision::parse(&value).unwrap_err();
            assert!(matches!(err, FlowError::InvalidDecision(_)), "{value}");
            assert_eq!(err.category(), crate::error::ErrorCategory::Configuration);
        }
    }

    #[test]
    fn blank_feedback_is_ignored() {
        assert_eq!(HumanDecision::reject(Some("  ".into())).feedback_text(), None);
        assert_eq!(HumanDecision::reject(Some(" no ".into())).feedback_text(), Some("no"));
    }

    #[tokio::test]
    async fn in_memory_store_hands_out_each_checkpoint_once() {
        let call = AgentToolCall {
            id: "call_1".into(),
            name: "send_email".into(),
            arguments: json!({}),
        };
        let checkpoint = ApprovalCheckpoint {
            id: "cp".into(),
            created_at: Utc::now(),
            transcript: vec![ModelMessage::assistant_with_tool_calls("", vec![call.clone()])],
            tool_call_index: 0,
            tool_call: call.clone(),
            depth: 0,
            used_tools: Vec::new(),
            source_documents: Vec::new(),
            artifacts: Vec::new(),
            usage: Usage::default(),
            available_tools: vec!["send_email".into()],
        };
        assert_eq!(checkpoint.batch_message_index(), Some(0));
        assert_eq!(checkpoint.batch(), vec![call]);

        let store = InMemoryCheckpointStore::new();
        store.save("chat:agent", checkpoint.clone()).await.unwrap();
        assert_eq!(store.take("chat:agent").await.unwrap(), Some(checkpoint));
        assert_eq!(store.take("chat:agent").await.unwrap(), None);
    }
}
