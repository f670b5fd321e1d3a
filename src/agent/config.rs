//! Per-node agent configuration.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::memory::MemoryConfig;
use crate::models::ModelSelector;
use crate::state::StateUpdate;
use crate::tools::ToolSelection;
use crate::types::{GenerationSettings, ModelMessage, ResponseFormat, Role};

/// Current [`AgentConfig`] layout version.
pub const AGENT_CONFIG_VERSION: u32 = 1;

/// Role given to the node's final message in chat history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReturnRole {
    User,
    #[default]
    Assistant,
}

impl From<ReturnRole> for Role {
    fn from(role: ReturnRole) -> Self {
        match role {
            ReturnRole::User => Role::User,
            ReturnRole::Assistant => Role::Assistant,
        }
    }
}

/// JSON schema the final answer is converted into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredOutput {
    pub name: String,
    pub schema: serde_json::Value,
}

impl StructuredOutput {
    pub fn response_format(&self) -> ResponseFormat {
        ResponseFormat::JsonSchema {
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }
}

/// Everything one agent node needs, fixed when the turn starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct AgentConfig {
    #[builder(default = AGENT_CONFIG_VERSION)]
    pub version: u32,
    /// Node label; names the final chat message.
    #[builder(into, default = "agent".to_string())]
    pub label: String,
    pub model: Option<ModelSelector>,
    #[builder(default)]
    pub settings: GenerationSettings,
    #[builder(default)]
    pub tools: Vec<ToolSelection>,
    /// Configured prompt messages (system instructions and examples).
    #[builder(default)]
    pub messages: Vec<ModelMessage>,
    #[builder(default)]
    pub memory: MemoryConfig,
    #[builder(default)]
    pub update_state: Vec<StateUpdate>,
    #[builder(default)]
    pub return_response_as: ReturnRole,
    pub structured_output: Option<StructuredOutput>,
    #[builder(default = true)]
    pub streaming: bool,
    /// Overrides the engine-wide tool recursion limit.
    pub max_tool_depth: Option<usize>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AgentConfig {
    /// Configured messages with system and developer entries moved first.
    pub fn ordered_messages(&self) -> Vec<ModelMessage> {
        let (mut leading, rest): (Vec<_>, Vec<_>) = self
            .messages
            .iter()
            .cloned()
            .partition(|message| matches!(message.role, Role::System | Role::Developer));
        leading.extend(rest);
        leading
    }
}
