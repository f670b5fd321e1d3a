//! flowagent: the agent execution core of a node-based LLM flow engine.
//!
//! Given a turn's input, a model binding, a set of tools and prior
//! conversation state, an [`agent::AgentOrchestrator`] assembles the prompt
//! from the configured memory strategy, drives the tool-calling loop, can
//! suspend before a tool that needs human approval and resume from a
//! checkpoint, streams partial output, and keeps image payloads out of
//! persisted history.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use flowagent::prelude::*;
//!
//! # async fn example(providers: ProviderRegistry) -> flowagent::error::Result<()> {
//! let orchestrator = AgentOrchestrator::new(
//!     providers,
//!     ToolRegistry::new(),
//!     Arc::new(InMemoryFileStore::new()),
//!     EngineConfig::default(),
//! );
//! let config = AgentConfig::builder()
//!     .model("openai:gpt-4o".parse()?)
//!     .build();
//! let result = orchestrator
//!     .run(
//!         TurnInput::text("Hello!"),
//!         &ConversationContext::default(),
//!         &config,
//!         TurnEnvironment::new(),
//!     )
//!     .await?;
//! println!("{}", result.final_text);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod error;
pub mod images;
pub mod memory;
pub mod models;
pub mod prelude;
pub mod provider;
pub mod state;
pub mod tools;
pub mod types;
