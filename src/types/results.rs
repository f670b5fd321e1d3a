//! Records produced by tool execution and carried into the turn result.

use serde::{Deserialize, Serialize};

/// A tool invocation as recorded for the caller and for chat history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsedTool {
    pub tool: String,
    pub tool_input: serde_json::Value,
    pub tool_output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UsedTool {
    /// Output rendered as plain text, the way a returns-direct answer is shown.
    pub fn output_text(&self) -> String {
        match &self.tool_output {
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Prefix marking artifact data that lives in the external file store.
pub const FILE_STORAGE_PREFIX: &str = "FILE-STORAGE::";

/// A rich output (image, html, chart...) attached to an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

impl Artifact {
    pub fn stored_image(kind: impl Into<String>, file_name: &str) -> Self {
        Self {
            kind: kind.into(),
            data: serde_json::Value::String(format!("{FILE_STORAGE_PREFIX}{file_name}")),
        }
    }

    /// File name when this artifact is an image held in the file store.
    pub fn stored_image_name(&self) -> Option<&str> {
        if !matches!(self.kind.as_str(), "png" | "jpeg" | "jpg" | "gif" | "webp") {
            return None;
        }
        self.data.as_str()?.strip_prefix(FILE_STORAGE_PREFIX)
    }
}

/// A retrieved document surfaced by a tool through its side channel.
pub type SourceDocument = serde_json::Value;
