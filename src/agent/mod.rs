//! Agent node execution: configuration, turn types, and the orchestrator.

pub mod config;
pub mod runtime;
pub mod turn;

pub use config::{AgentConfig, ReturnRole, StructuredOutput, AGENT_CONFIG_VERSION};
pub use runtime::{checkpoint_key, AgentOrchestrator, ResolvedAgent};
pub use turn::{ConversationContext, TurnEnvironment, TurnInput, TurnResult};
