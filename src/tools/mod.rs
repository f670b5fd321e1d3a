//! Tool system for function calling.

pub mod arguments;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use registry::{ToolFactory, ToolRegistry, ToolSelection};
pub use tool::{AgentTool, HumanGatedTool, Tool, ToolExecutionContext};
pub use types::{AgentToolParameters, ToolDescriptor};
