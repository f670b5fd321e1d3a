//! Model descriptors and selector parsing.

pub mod capabilities;
pub mod selector;

pub use capabilities::ModelCapabilities;
pub use selector::ModelSelector;
