//! Transcript sanitization applied right before a model call.

use std::collections::HashSet;

use crate::models::ModelCapabilities;
use crate::types::{ContentPart, ModelMessage, Role};

/// Shape a transcript into something any model binding can accept.
///
/// - file references that were not inlined become short text placeholders
///   (inline images too, when the model has no vision support);
/// - tool calls without an id, or never answered by a tool message, are
///   removed from assistant messages;
/// - tool messages answering a call that is not in the transcript are dropped;
/// - messages left without content are dropped.
pub fn sanitize_messages_for_model(
    messages: &[ModelMessage],
    capabilities: &ModelCapabilities,
) -> Vec<ModelMessage> {
    let answered_calls: HashSet<&str> = messages
        .iter()
        .filter(|message| message.role == Role::Tool)
        .filter_map(ModelMessage::tool_call_id)
        .collect();
    let mut seen_calls: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(messages.len());

    for message in messages {
        if message.role == Role::Tool {
            let answered = message
                .tool_call_id()
                .is_some_and(|id| seen_calls.contains(id));
            if !answered {
                tracing::debug!(
                    tool_call_id = message.tool_call_id().unwrap_or_default(),
                    "dropping tool message without a matching call"
                );
                continue;
            }
            out.push(message.clone());
            continue;
        }

        let mut parts = Vec::with_capacity(message.content.len());
        for part in &message.content {
            match part {
                ContentPart::ToolCall(call) => {
                    if call.id.trim().is_empty() {
                        continue;
                    }
                    if !answered_calls.contains(call.id.as_str()) {
                        tracing::debug!(
                            tool_call_id = %call.id,
                            tool = %call.name,
                            "dropping tool call without a tool message"
                        );
                        continue;
                    }
                    seen_calls.insert(call.id.clone());
                    parts.push(part.clone());
                }
                ContentPart::FileRef(file) => parts.push(ContentPart::text(format!(
                    "[attached file: {}]",
                    file.name
                ))),
                ContentPart::Image(_) if !capabilities.supports_vision => {
                    parts.push(ContentPart::text("[image]"));
                }
                other => parts.push(other.clone()),
            }
        }
        if parts.is_empty() {
            continue;
        }
        let mut next = message.clone();
        next.content = parts;
        // Attachments are for persistence only.
        next.attachments = None;
        out.push(next);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentToolCall, ImageContent, StoredFileRef};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn call(id: &str) -> AgentToolCall {
        AgentToolCall {
            id: id.into(),
            name: "lookup".into(),
            arguments: json!({}),
        }
    }

    #[test]
    fn drops_orphan_tool_messages_and_idless_calls() {
        let messages = vec![
            ModelMessage::user("hi"),
            ModelMessage::tool_result("ghost", "lookup", json!("x"), false),
            ModelMessage::assistant_with_tool_calls("", vec![call(""), call("c1")]),
            ModelMessage::tool_result("c1", "lookup", json!("ok"), false),
        ];
        let sanitized = sanitize_messages_for_model(&messages, &ModelCapabilities::full());
        assert_eq!(sanitized.len(), 3);
        assert_eq!(sanitized[1].tool_calls().len(), 1);
        assert_eq!(sanitized[2].tool_call_id(), Some("c1"));
    }

    #[test]
    fn unanswered_calls_are_dropped() {
        let messages = vec![
            ModelMessage::user("hi"),
            ModelMessage::assistant_with_tool_calls("Checking.", vec![call("c1"), call("c2")]),
            ModelMessage::tool_result("c2", "lookup", json!("ok"), false),
            ModelMessage::assistant_with_tool_calls("", vec![call("c3")]),
        ];
        let sanitized = sanitize_messages_for_model(&messages, &ModelCapabilities::full());
        assert_eq!(sanitized.len(), 3);
        let ids: Vec<_> = sanitized[1].tool_calls().iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec!["c2".to_string()]);
        assert_eq!(sanitized[1].text(), "Checking.");
        assert_eq!(sanitized[2].tool_call_id(), Some("c2"));
    }

    #[test]
    fn leftover_file_refs_become_placeholders() {
        let messages = vec![ModelMessage::from_parts(
            Role::User,
            vec![ContentPart::FileRef(StoredFileRef::stored("report.pdf", "application/pdf"))],
        )];
        let sanitized = sanitize_messages_for_model(&messages, &ModelCapabilities::full());
        assert_eq!(sanitized[0].text(), "[attached file: report.pdf]");
    }

    #[test]
    fn images_are_replaced_without_vision() {
        let messages = vec![ModelMessage::from_parts(
            Role::User,
            vec![ContentPart::Image(ImageContent {
                url: "data:image/png;base64,AAAA".into(),
                mime_type: "image/png".into(),
                detail: None,
                origin: None,
            })],
        )];
        let no_vision = ModelCapabilities::default();
        let sanitized = sanitize_messages_for_model(&messages, &no_vision);
        assert_eq!(sanitized[0].text(), "[image]");
    }
}
