//! Message types shared by every stage of a turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::results::{Artifact, SourceDocument, UsedTool};

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<MessageAttachments>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ModelMessage {
    /// Create a message of any role from plain text.
    pub fn text_message(role: Role, text: impl Into<String>) -> Self {
        Self::from_parts(role, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create a message from explicit content parts.
    pub fn from_parts(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            name: None,
            attachments: None,
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::text_message(Role::System, text)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text_message(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text_message(Role::Assistant, text)
    }

    /// Create an assistant message carrying text (possibly empty) and tool calls.
    pub fn assistant_with_tool_calls(text: impl Into<String>, calls: Vec<AgentToolCall>) -> Self {
        let text = text.into();
        let mut content = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            content.push(ContentPart::Text { text });
        }
        content.extend(calls.into_iter().map(ContentPart::ToolCall));
        Self::from_parts(Role::Assistant, content)
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: serde_json::Value,
        is_error: bool,
    ) -> Self {
        let mut message = Self::from_parts(
            Role::Tool,
            vec![ContentPart::ToolResult(AgentToolResult {
                tool_call_id: tool_call_id.into(),
                result,
                is_error,
            })],
        );
        message.name = Some(tool_name.into());
        message
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attachments(mut self, attachments: MessageAttachments) -> Self {
        self.attachments = if attachments.is_empty() {
            None
        } else {
            Some(attachments)
        };
        self
    }

    /// Extract the text content, concatenating all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract tool calls from this message.
    pub fn tool_calls(&self) -> Vec<&AgentToolCall> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(tc) => Some(tc),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.content
            .iter()
            .any(|part| matches!(part, ContentPart::ToolCall(_)))
    }

    /// The tool call id a `tool` message answers.
    pub fn tool_call_id(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            ContentPart::ToolResult(result) => Some(result.tool_call_id.as_str()),
            _ => None,
        })
    }

    /// Stored-file references carried by this message.
    pub fn file_refs(&self) -> impl Iterator<Item = &StoredFileRef> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::FileRef(file) => Some(file),
            _ => None,
        })
    }

    /// Render content as the flat text used for token counting and summaries.
    pub fn transcript_text(&self) -> String {
        let mut out = String::new();
        for part in &self.content {
            let piece = match part {
                ContentPart::Text { text } => text.clone(),
                ContentPart::Image(_) => "[image]".to_string(),
                ContentPart::FileRef(file) => format!("[file: {}]", file.name),
                ContentPart::ToolCall(call) => format!("[tool call {}: {}]", call.name, call.arguments),
                ContentPart::ToolResult(result) => match &result.result {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                },
            };
            if !out.is_empty() && !piece.is_empty() {
                out.push(' ');
            }
            out.push_str(&piece);
        }
        out
    }
}

/// Conversation role.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Developer,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Inline image payload, only ever present while a model call is being prepared.
    Image(ImageContent),
    /// Reference to a file held by the external file store.
    FileRef(StoredFileRef),
    ToolCall(AgentToolCall),
    ToolResult(AgentToolResult),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Image content embedded in a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageContent {
    /// `data:<mime>;base64,<payload>` URL or a remote URL.
    pub url: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Which reference this payload was resolved from; `None` for model-produced images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ImageOrigin>,
}

/// Where an inline image came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrigin {
    /// Uploaded with the current turn.
    Turn,
    /// Resolved from persisted history.
    Past,
    /// Inserted temporarily from an earlier assistant artifact.
    Artifact,
}

/// Kind of stored file reference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FileRefKind {
    StoredFile,
    Url,
}

/// A reference to a file that lives outside conversation storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StoredFileRef {
    pub kind: FileRefKind,
    /// File name in the store, or the remote URL for [`FileRefKind::Url`].
    pub name: String,
    pub mime: String,
}

impl StoredFileRef {
    pub fn stored(name: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            kind: FileRefKind::StoredFile,
            name: name.into(),
            mime: mime.into(),
        }
    }

    pub fn url(url: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            kind: FileRefKind::Url,
            name: url.into(),
            mime: mime.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A tool execution result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentToolResult {
    pub tool_call_id: String,
    pub result: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

/// Structured extras persisted alongside a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageAttachments {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub used_tools: Vec<UsedTool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_annotations: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_documents: Vec<SourceDocument>,
}

impl MessageAttachments {
    pub fn is_empty(&self) -> bool {
        self.used_tools.is_empty()
            && self.artifacts.is_empty()
            && self.file_annotations.is_empty()
            && self.source_documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn content_parts_serialize_with_type_tag() {
        let message = ModelMessage::from_parts(
            Role::User,
            vec![
                ContentPart::text("look"),
                ContentPart::FileRef(StoredFileRef::stored("cat.png", "image/png")),
            ],
        );
        let value = serde_json::to_value(&message.content).unwrap();
        assert_eq!(
            value,
            json!([
                {"type": "text", "text": "look"},
                {"type": "file_ref", "kind": "stored-file", "name": "cat.png", "mime": "image/png"}
            ])
        );
    }

    #[test]
    fn assistant_with_tool_calls_omits_empty_text() {
        let message = ModelMessage::assistant_with_tool_calls(
            "",
            vec![AgentToolCall {
                id: "c1".into(),
                name: "get_weather".into(),
                arguments: json!({"city": "Paris"}),
            }],
        );
        assert_eq!(message.content.len(), 1);
        assert!(message.has_tool_calls());
        assert_eq!(message.tool_calls()[0].name, "get_weather");
    }

    #[test]
    fn tool_result_exposes_call_id_and_name() {
        let message = ModelMessage::tool_result("c9", "lookup", json!("ok"), false);
        assert_eq!(message.tool_call_id(), Some("c9"));
        assert_eq!(message.name.as_deref(), Some("lookup"));
        assert_eq!(message.transcript_text(), "ok");
    }

    #[test]
    fn role_parses_from_lowercase() {
        assert_eq!("developer".parse::<Role>().unwrap(), Role::Developer);
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
