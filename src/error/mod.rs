//! Error types for the agent execution core.

use thiserror::Error;

/// Broad error category used by callers to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// The turn was aborted by its cancellation token.
    Cancellation,
    /// The node or engine is misconfigured; the turn cannot proceed.
    Configuration,
    ToolExecution,
    Stream,
    Provider,
    Storage,
    Serialization,
    Internal,
}

/// Primary error type for all turn operations.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Tool recursion depth exceeded: more than {depth} model calls after tool batches")]
    RecursionLimit { depth: usize },

    #[error("Invalid human input decision: {0}")]
    InvalidDecision(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Turn canceled")]
    Canceled,

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("File store error: {0}")]
    FileStore(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl FlowError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Canceled => ErrorCategory::Cancellation,
            Self::Configuration(_)
            | Self::RecursionLimit { .. }
            | Self::InvalidDecision(_)
            | Self::ModelNotFound(_)
            | Self::ToolNotFound(_)
            | Self::InvalidArgument(_) => ErrorCategory::Configuration,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Stream(_) | Self::Timeout(_) => ErrorCategory::Stream,
            Self::Provider { .. } => ErrorCategory::Provider,
            Self::FileStore(_) => ErrorCategory::Storage,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::InvalidState(_) => ErrorCategory::Internal,
        }
    }

    /// Whether this error is the distinguished cancellation outcome.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, FlowError>;
