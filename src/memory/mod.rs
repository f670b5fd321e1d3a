//! Memory reduction: turns history plus the new turn into prompt messages.

pub mod summary;

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::FlowError;
use crate::provider::ModelProvider;
use crate::types::{ContentPart, ModelMessage, Role, StoredFileRef, Usage};

pub use summary::{serialize_transcript, DEFAULT_SUMMARY_PROMPT, SUMMARY_MESSAGE_PREFIX};

/// How prior conversation is condensed before it reaches the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum MemoryStrategy {
    /// Past and runtime history verbatim.
    #[default]
    #[serde(rename = "allMessages")]
    All,
    /// The last `size` request/response pairs.
    #[serde(rename = "windowSize")]
    Window { size: usize },
    /// One model-written summary replacing all history.
    #[serde(rename = "conversationSummary")]
    Summary,
    /// Summarize only the oldest messages that push history over the limit.
    #[serde(rename = "conversationSummaryBuffer")]
    SummaryBuffer {
        #[serde(default)]
        max_token_limit: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
enum MemoryStrategyKind {
    #[strum(serialize = "allMessages")]
    All,
    #[strum(serialize = "windowSize")]
    Window,
    #[strum(serialize = "conversationSummary")]
    Summary,
    #[strum(serialize = "conversationSummaryBuffer")]
    SummaryBuffer,
}

impl MemoryStrategy {
    /// Build a strategy from its configuration name and optional parameters.
    pub fn from_parts(
        name: &str,
        window_size: Option<usize>,
        max_token_limit: Option<usize>,
    ) -> Result<Self, FlowError> {
        let kind = MemoryStrategyKind::from_str(name).map_err(|_| {
            FlowError::Configuration(format!("unknown memory strategy '{name}'"))
        })?;
        Ok(match kind {
            MemoryStrategyKind::All => Self::All,
            MemoryStrategyKind::Window => Self::Window {
                size: window_size.ok_or_else(|| {
                    FlowError::configuration("windowSize memory requires a window size")
                })?,
            },
            MemoryStrategyKind::Summary => Self::Summary,
            MemoryStrategyKind::SummaryBuffer => Self::SummaryBuffer { max_token_limit },
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::All => "allMessages",
            Self::Window { .. } => "windowSize",
            Self::Summary => "conversationSummary",
            Self::SummaryBuffer { .. } => "conversationSummaryBuffer",
        }
    }
}

/// Memory section of a node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub strategy: MemoryStrategy,
    /// Replaces the turn input as the trailing user message.
    pub user_message: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: MemoryStrategy::All,
            user_message: None,
        }
    }
}

/// The new material a turn contributes to the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnPrompt<'a> {
    pub input: &'a str,
    pub uploads: &'a [StoredFileRef],
}

/// Reduced prompt plus whatever the summarization calls cost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReducedMemory {
    pub messages: Vec<ModelMessage>,
    pub usage: Usage,
}

/// Applies a [`MemoryStrategy`] using a model for token counts and summaries.
pub struct MemoryReducer {
    model: Arc<dyn ModelProvider>,
    summary_prompt: String,
    default_token_limit: usize,
}

impl MemoryReducer {
    pub fn new(model: Arc<dyn ModelProvider>) -> Self {
        Self {
            model,
            summary_prompt: DEFAULT_SUMMARY_PROMPT.to_string(),
            default_token_limit: crate::config::DEFAULT_SUMMARY_TOKEN_LIMIT,
        }
    }

    pub fn with_summary_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.summary_prompt = prompt.into();
        self
    }

    pub fn with_default_token_limit(mut self, limit: usize) -> Self {
        self.default_token_limit = limit;
        self
    }

    /// Build the prompt messages for one turn.
    ///
    /// History is reduced first. Then come this turn's uploads and the input
    /// (or the configured override). Input and uploads are only added when the
    /// node is the first of the run; later nodes find them in runtime history.
    pub async fn reduce(
        &self,
        past: &[ModelMessage],
        runtime: &[ModelMessage],
        turn: TurnPrompt<'_>,
        config: &MemoryConfig,
        cancel: CancellationToken,
    ) -> Result<ReducedMemory, FlowError> {
        let first_node = runtime.is_empty();
        let mut reduced = if config.enabled {
            let history: Vec<ModelMessage> = past.iter().chain(runtime).cloned().collect();
            self.reduce_history(&history, &config.strategy, cancel).await?
        } else {
            ReducedMemory::default()
        };

        if first_node {
            if let Some(upload_message) = upload_message(&reduced.messages, turn.uploads) {
                reduced.messages.push(upload_message);
            }
        }

        let override_message = config
            .user_message
            .as_deref()
            .filter(|text| config.enabled && !text.trim().is_empty());
        match override_message {
            Some(text) => reduced.messages.push(ModelMessage::user(text)),
            None if first_node && !turn.input.is_empty() => {
                reduced.messages.push(ModelMessage::user(turn.input))
            }
            None => {}
        }
        Ok(reduced)
    }

    /// Apply `strategy` to `history` alone.
    pub async fn reduce_history(
        &self,
        history: &[ModelMessage],
        strategy: &MemoryStrategy,
        cancel: CancellationToken,
    ) -> Result<ReducedMemory, FlowError> {
        tracing::debug!(strategy = strategy.name(), messages = history.len(), "reducing memory");
        match strategy {
            MemoryStrategy::All => Ok(ReducedMemory {
                messages: history.to_vec(),
                usage: Usage::default(),
            }),
            MemoryStrategy::Window { size } => Ok(ReducedMemory {
                messages: window(history, *size),
                usage: Usage::default(),
            }),
            MemoryStrategy::Summary => {
                if history.is_empty() {
                    return Ok(ReducedMemory::default());
                }
                let (text, usage) =
                    summary::summarize(&self.model, &self.summary_prompt, history, cancel).await?;
                Ok(ReducedMemory {
                    messages: vec![ModelMessage::assistant(text)],
                    usage,
                })
            }
            MemoryStrategy::SummaryBuffer { max_token_limit } => {
                let limit = max_token_limit.unwrap_or(self.default_token_limit);
                self.summary_buffer(history, limit, cancel).await
            }
        }
    }

    async fn summary_buffer(
        &self,
        history: &[ModelMessage],
        limit: usize,
        cancel: CancellationToken,
    ) -> Result<ReducedMemory, FlowError> {
        let mut cut = 0usize;
        let mut tokens = self.measure(history).await?;
        while tokens > limit && cut < history.len() {
            if cancel.is_cancelled() {
                return Err(FlowError::Canceled);
            }
            cut += 1;
            tokens = self.measure(&history[cut..]).await?;
        }
        if cut == 0 {
            return Ok(ReducedMemory {
                messages: history.to_vec(),
                usage: Usage::default(),
            });
        }

        tracing::debug!(evicted = cut, retained_tokens = tokens, limit, "summarizing evicted prefix");
        let (text, usage) =
            summary::summarize(&self.model, &self.summary_prompt, &history[..cut], cancel).await?;
        let mut messages = Vec::with_capacity(history.len() - cut + 1);
        messages.push(ModelMessage::system(format!("{SUMMARY_MESSAGE_PREFIX}{text}")));
        messages.extend_from_slice(&history[cut..]);
        Ok(ReducedMemory { messages, usage })
    }

    async fn measure(&self, messages: &[ModelMessage]) -> Result<usize, FlowError> {
        if messages.is_empty() {
            return Ok(0);
        }
        self.model.count_tokens(&serialize_transcript(messages)).await
    }
}

/// The trailing `2 * size` messages, order preserved.
pub fn window(history: &[ModelMessage], size: usize) -> Vec<ModelMessage> {
    let keep = size.saturating_mul(2).min(history.len());
    history[history.len() - keep..].to_vec()
}

/// A user message carrying the uploads not already referenced in `messages`.
fn upload_message(messages: &[ModelMessage], uploads: &[StoredFileRef]) -> Option<ModelMessage> {
    let mut parts: Vec<ContentPart> = Vec::new();
    for upload in uploads {
        let already_present = messages
            .iter()
            .flat_map(ModelMessage::file_refs)
            .any(|existing| existing == upload)
            || parts
                .iter()
                .any(|part| matches!(part, ContentPart::FileRef(existing) if existing == upload));
        if !already_present {
            parts.push(ContentPart::FileRef(upload.clone()));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(ModelMessage::from_parts(Role::User, parts))
    }
}
