//! Typed access to tool call arguments.

use crate::error::FlowError;

/// Wrapper around tool call arguments providing typed extraction.
///
/// Models occasionally send arguments as a JSON-encoded string; those are
/// decoded on construction so accessors always see an object.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        let value = match value {
            serde_json::Value::String(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(trimmed).unwrap_or(serde_json::Value::String(raw))
                }
            }
            serde_json::Value::Null => serde_json::json!({}),
            other => other,
        };
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn get_str(&self, key: &str) -> Result<&str, FlowError> {
        self.get_str_opt(key)
            .ok_or_else(|| FlowError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, FlowError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| FlowError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, FlowError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| FlowError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, FlowError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            FlowError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
