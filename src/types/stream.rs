//! Streaming chunk type.

use serde::{Deserialize, Serialize};

use super::generation::FinishReason;
use super::message::{AgentToolCall, ImageContent};
use super::usage::Usage;

/// One increment of a streamed model response.
///
/// `text` is additive. `tool_calls`, `usage` and `finish_reason` are
/// snapshots: when several chunks carry them, the last one wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageChunk {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<AgentToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageContent>,
}

impl MessageChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}
