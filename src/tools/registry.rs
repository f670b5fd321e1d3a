//! Tool registry: resolves a node's tool selections to tool instances.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::tool::{HumanGatedTool, Tool};
use crate::error::FlowError;

/// Factory for tools registered under one or more keys.
///
/// A factory may produce several tools from one selection (for example a
/// toolkit exposing one tool per remote operation).
pub trait ToolFactory: Send + Sync {
    fn tool_keys(&self) -> Vec<&str>;

    fn create(
        &self,
        tool_key: &str,
        config: &serde_json::Value,
    ) -> Result<Vec<Arc<dyn Tool>>, FlowError>;
}

/// One tool entry in a node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolSelection {
    /// Registry key.
    pub tool: String,
    #[serde(default)]
    pub config: serde_json::Value,
    /// Gate every tool produced by this selection behind human approval.
    #[serde(default)]
    pub requires_human_input: bool,
}

impl ToolSelection {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            ..Default::default()
        }
    }

    pub fn with_human_input(mut self) -> Self {
        self.requires_human_input = true;
        self
    }
}

/// Registry mapping tool keys to their factories.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    factories: HashMap<String, Arc<dyn ToolFactory>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for all tool keys it declares.
    pub fn register(&mut self, factory: Arc<dyn ToolFactory>) {
        for key in factory.tool_keys() {
            self.factories.insert(key.to_string(), factory.clone());
        }
    }

    /// Register a single ready-made tool under its own name.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        let key = tool.name().to_string();
        self.factories
            .insert(key.clone(), Arc::new(SingleToolFactory { key, tool }));
    }

    pub fn has_tool(&self, tool_key: &str) -> bool {
        self.factories.contains_key(tool_key)
    }

    /// Instantiate every selection, tagging each tool with its selection key.
    pub fn resolve(&self, selections: &[ToolSelection]) -> Result<Vec<Arc<dyn Tool>>, FlowError> {
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        for selection in selections {
            let factory = self.factories.get(&selection.tool).ok_or_else(|| {
                FlowError::ToolNotFound(format!(
                    "No tool factory registered for '{}'",
                    selection.tool
                ))
            })?;
            for tool in factory.create(&selection.tool, &selection.config)? {
                tools.push(Arc::new(HumanGatedTool::new(
                    tool,
                    selection.tool.clone(),
                    selection.requires_human_input,
                )));
            }
        }
        Ok(tools)
    }
}

struct SingleToolFactory {
    key: String,
    tool: Arc<dyn Tool>,
}

impl ToolFactory for SingleToolFactory {
    fn tool_keys(&self) -> Vec<&str> {
        vec![self.key.as_str()]
    }

    fn create(
        &self,
        _tool_key: &str,
        _config: &serde_json::Value,
    ) -> Result<Vec<Arc<dyn Tool>>, FlowError> {
        Ok(vec![self.tool.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{AgentTool, AgentToolParameters};
    use serde_json::json;

    struct Toolkit;

    impl ToolFactory for Toolkit {
        fn tool_keys(&self) -> Vec<&str> {
            vec!["calendar"]
        }

        fn create(
            &self,
            _tool_key: &str,
            config: &serde_json::Value,
        ) -> Result<Vec<Arc<dyn Tool>>, FlowError> {
            let prefix = config["prefix"].as_str().unwrap_or("cal").to_string();
            Ok(["list", "create"]
                .into_iter()
                .map(|op| {
                    Arc::new(AgentTool::new(
                        format!("{prefix}_{op}"),
                        "calendar operation",
                        AgentToolParameters::empty(),
                        |_args, _ctx| async { Ok(json!("ok")) },
                    )) as Arc<dyn Tool>
                })
                .collect())
        }
    }

    #[test]
    fn selection_expands_factory_tools_with_group_and_gate() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Toolkit));

        let selection = ToolSelection {
            tool: "calendar".into(),
            config: json!({"prefix": "gcal"}),
            requires_human_input: true,
        };
        let tools = registry.resolve(&[selection]).unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["gcal_list", "gcal_create"]);
        assert!(tools.iter().all(|t| t.requires_human_input()));
        assert!(tools.iter().all(|t| t.group() == Some("calendar")));
    }

    #[test]
    fn single_tools_register_under_their_name() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(Arc::new(AgentTool::new(
            "clock",
            "current time",
            AgentToolParameters::empty(),
            |_args, _ctx| async { Ok(json!("12:00")) },
        )));
        assert!(registry.has_tool("clock"));
        let tools = registry.resolve(&[ToolSelection::new("clock")]).unwrap();
        assert_eq!(tools.len(), 1);
        assert!(!tools[0].requires_human_input());
    }

    #[test]
    fn unknown_selection_is_configuration_error() {
        let registry = ToolRegistry::new();
        let err = registry.resolve(&[ToolSelection::new("missing")]).err().unwrap();
        assert!(matches!(err, FlowError::ToolNotFound(_)));
        assert_eq!(err.category(), crate::error::ErrorCategory::Configuration);
    }
}
