//! Tool invocation loop, human approval gate, and stream emission.

pub mod approvals;
pub mod events;
pub mod markers;
pub mod runner;
pub mod types;

pub use approvals::{
    ApprovalCheckpoint, CheckpointStore, DecisionType, HumanDecision, InMemoryCheckpointStore,
};
pub use events::{
    CallbackSink, ChannelSink, NoopSink, StreamEmitter, StreamEvent, StreamEventCallback,
    StreamSink,
};
pub use markers::{split_side_channels, SideChannels};
pub use runner::ToolLoop;
pub use types::{LoopOutcome, LoopSettings, ResumePoint};
