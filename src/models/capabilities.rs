//! Model capabilities descriptor.

use serde::{Deserialize, Serialize};

/// Describes what a bound model can do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCapabilities {
    /// Accepts tool definitions and answers with tool calls.
    pub supports_tools: bool,
    /// Answers incrementally; otherwise the turn output arrives as one token.
    pub supports_streaming: bool,
    /// Accepts inline image payloads.
    pub supports_vision: bool,
    /// Honours a JSON-schema response format (needed for structured output).
    pub supports_json_schema: bool,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            supports_tools: false,
            supports_streaming: true,
            supports_vision: false,
            supports_json_schema: false,
        }
    }
}

impl ModelCapabilities {
    /// Full-featured model capabilities.
    pub fn full() -> Self {
        Self {
            supports_tools: true,
            supports_streaming: true,
            supports_vision: true,
            supports_json_schema: true,
        }
    }
}
