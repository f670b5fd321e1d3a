//! Summarization prompt and transcript serialization.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::FlowError;
use crate::provider::{ModelProvider, ProviderRequest};
use crate::types::{GenerationSettings, ModelMessage, Usage};

pub const CONVERSATION_PLACEHOLDER: &str = "{conversation}";

pub const DEFAULT_SUMMARY_PROMPT: &str = "Progressively summarize the conversation provided and return a new summary.

EXAMPLE:
Human: Why do you think artificial intelligence is a force for good?
AI: Because artificial intelligence will help humans reach their full potential.

New summary:
The human asks what the AI thinks of artificial intelligence. The AI thinks artificial intelligence is a force for good because it will help humans reach their full potential.

END OF EXAMPLE

Conversation:
{conversation}

New summary:";

pub const SUMMARY_MESSAGE_PREFIX: &str = "Previous conversation summary: ";

/// Serialize messages as `role: content` lines.
pub fn serialize_transcript(messages: &[ModelMessage]) -> String {
    messages
        .iter()
        .map(|message| format!("{}: {}", message.role, message.transcript_text()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ask the model for a single-shot summary of `messages`.
pub(crate) async fn summarize(
    provider: &Arc<dyn ModelProvider>,
    prompt_template: &str,
    messages: &[ModelMessage],
    cancel: CancellationToken,
) -> Result<(String, Usage), FlowError> {
    let prompt = prompt_template.replace(CONVERSATION_PLACEHOLDER, &serialize_transcript(messages));
    let request = ProviderRequest {
        messages: vec![ModelMessage::user(prompt)],
        settings: GenerationSettings::default(),
        tools: None,
        response_format: None,
    };
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(FlowError::Canceled),
        result = provider.generate_text(&request, cancel.clone()) => result?,
    };
    Ok((response.text.trim().to_string(), response.usage))
}
