//! Convenience re-exports for running agent turns.

pub use crate::agent::{
    AgentConfig, AgentOrchestrator, ConversationContext, ResolvedAgent, ReturnRole,
    TurnEnvironment, TurnInput, TurnResult,
};
pub use crate::agent_loop::{
    ApprovalCheckpoint, ChannelSink, DecisionType, HumanDecision, StreamEvent, StreamSink,
};
pub use crate::config::EngineConfig;
pub use crate::error::{FlowError, Result};
pub use crate::images::{FileStore, InMemoryFileStore};
pub use crate::memory::{MemoryConfig, MemoryStrategy};
pub use crate::models::{ModelCapabilities, ModelSelector};
pub use crate::provider::{ModelProvider, ProviderFactory, ProviderRegistry, ProviderResponse};
pub use crate::state::{FlowState, StateUpdate};
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments, ToolRegistry, ToolSelection};
pub use crate::types::{ContentPart, ModelMessage, Role, StoredFileRef, Usage, UsedTool};
