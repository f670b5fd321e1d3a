//! Model selection and parsing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// A `provider:model_id` selector naming the model a node binds to.
///
/// Examples: `"openai:gpt-4o"`, `"ollama:llama3.3"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelSelector {
    pub provider: String,
    pub model_id: String,
}

impl ModelSelector {
    pub fn new(provider: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model_id: model_id.into(),
        }
    }
}

impl FromStr for ModelSelector {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(FlowError::configuration("no model selected"));
        }
        let (provider, model_id) = trimmed.split_once(':').ok_or_else(|| {
            FlowError::Configuration(format!(
                "Invalid model selector '{trimmed}': expected 'provider:model_id'"
            ))
        })?;
        if provider.is_empty() || model_id.is_empty() {
            return Err(FlowError::Configuration(format!(
                "Invalid model selector '{trimmed}': provider and model id must be non-empty"
            )));
        }
        Ok(Self::new(provider, model_id))
    }
}

impl TryFrom<String> for ModelSelector {
    type Error = FlowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModelSelector> for String {
    fn from(value: ModelSelector) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model_id)
    }
}
