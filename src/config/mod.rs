//! Engine-wide configuration (layered: code > env > TOML file > defaults).

use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

pub const DEFAULT_MAX_TOOL_DEPTH: usize = 25;
pub const DEFAULT_SUMMARY_TOKEN_LIMIT: usize = 2000;
pub const DEFAULT_STREAM_IDLE_TIMEOUT_MS: u64 = 120_000;

const ENV_MAX_TOOL_DEPTH: &str = "FLOWAGENT_MAX_TOOL_DEPTH";
const ENV_SUMMARY_TOKEN_LIMIT: &str = "FLOWAGENT_SUMMARY_TOKEN_LIMIT";
const ENV_STREAM_IDLE_TIMEOUT_MS: &str = "FLOWAGENT_STREAM_IDLE_TIMEOUT_MS";
const ENV_IMAGE_DETAIL: &str = "FLOWAGENT_IMAGE_DETAIL";

/// Defaults shared by every agent node the engine runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum model re-invocations after tool batches within one turn.
    pub max_tool_depth: usize,
    /// Token limit used when a summary-buffer strategy does not set one.
    pub summary_buffer_token_limit: usize,
    /// Abort a stream that produces no chunk for this long; 0 disables.
    pub stream_idle_timeout_ms: u64,
    /// Replaces the built-in summarization prompt; must contain `{conversation}`.
    pub summary_prompt: Option<String>,
    /// Detail hint attached to inline images (`low`, `high`, `auto`).
    pub image_detail: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_depth: DEFAULT_MAX_TOOL_DEPTH,
            summary_buffer_token_limit: DEFAULT_SUMMARY_TOKEN_LIMIT,
            stream_idle_timeout_ms: DEFAULT_STREAM_IDLE_TIMEOUT_MS,
            summary_prompt: None,
            image_detail: "low".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, FlowError> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| FlowError::Configuration(format!("invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load from environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, FlowError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Global default config.
    ///
    /// Falls back to plain defaults when the environment is invalid.
    pub fn global() -> &'static EngineConfig {
        DEFAULT_CONFIG.get_or_init(|| {
            Self::from_env().unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring invalid engine environment");
                Self::default()
            })
        })
    }

    /// Apply overrides from a key lookup (environment or test map).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, FlowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_TOOL_DEPTH) {
            self.max_tool_depth = parse_number(ENV_MAX_TOOL_DEPTH, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SUMMARY_TOKEN_LIMIT) {
            self.summary_buffer_token_limit = parse_number(ENV_SUMMARY_TOKEN_LIMIT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_STREAM_IDLE_TIMEOUT_MS) {
            self.stream_idle_timeout_ms = parse_number(ENV_STREAM_IDLE_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_IMAGE_DETAIL) {
            self.image_detail = raw.trim().to_string();
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), FlowError> {
        if self.max_tool_depth == 0 {
            return Err(FlowError::configuration("max_tool_depth must be at least 1"));
        }
        if let Some(prompt) = &self.summary_prompt {
            if !prompt.contains("{conversation}") {
                return Err(FlowError::configuration(
                    "summary_prompt must contain the {conversation} placeholder",
                ));
            }
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, FlowError> {
    raw.trim()
        .parse()
        .map_err(|_| FlowError::Configuration(format!("{key} must be a non-negative integer, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_tool_depth, 25);
        assert_eq!(config.summary_buffer_token_limit, 2000);
        assert_eq!(config.image_detail, "low");
    }

    #[test]
    fn overrides_replace_defaults() {
        let config = EngineConfig::default()
            .with_overrides(lookup(&[
                ("FLOWAGENT_MAX_TOOL_DEPTH", "4"),
                ("FLOWAGENT_STREAM_IDLE_TIMEOUT_MS", "0"),
                ("FLOWAGENT_IMAGE_DETAIL", " high "),
            ]))
            .unwrap();
        assert_eq!(config.max_tool_depth, 4);
        assert_eq!(config.stream_idle_timeout_ms, 0);
        assert_eq!(config.image_detail, "high");
        assert_eq!(config.summary_buffer_token_limit, 2000);
    }

    #[test]
    fn invalid_numbers_are_configuration_errors() {
        let err = EngineConfig::default()
            .with_overrides(lookup(&[("FLOWAGENT_MAX_TOOL_DEPTH", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("FLOWAGENT_MAX_TOOL_DEPTH"));

        let err = EngineConfig::default()
            .with_overrides(lookup(&[("FLOWAGENT_MAX_TOOL_DEPTH", "0")]))
            .unwrap_err();
        assert!(matches!(err, FlowError::Configuration(_)));
    }

    #[test]
    fn toml_file_keeps_unset_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_tool_depth = 8\nsummary_prompt = \"Sum up:\\n{{conversation}}\"").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_tool_depth, 8);
        assert_eq!(config.summary_prompt.as_deref(), Some("Sum up:\n{conversation}"));
        assert_eq!(config.stream_idle_timeout_ms, DEFAULT_STREAM_IDLE_TIMEOUT_MS);
    }

    #[test]
    fn summary_prompt_without_placeholder_is_rejected() {
        let err = EngineConfig::from_toml_str("summary_prompt = \"no slot\"").unwrap_err();
        assert!(err.to_string().contains("{conversation}"));
    }
}
