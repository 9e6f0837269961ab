//! Test helpers shared across minder crates.

pub mod providers;
pub mod sinks;
pub mod tools;

pub use providers::{ScriptedProvider, final_answer, tool_call};
pub use sinks::CollectingSink;
pub use tools::{ConfirmTool, EchoTool, FailingTool, ResourceTool, SlowTool};
