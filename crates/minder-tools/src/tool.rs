//! Tool trait definition and descriptor.

use async_trait::async_trait;
use minder_protocol::ToolError;
use serde_json::Value;
use std::fmt::Debug;

/// Static metadata describing a capability the agent may invoke.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Unique tool name, the invariant identity used in every dispatch.
    pub name: String,
    /// Tool description advertised to the model.
    pub description: String,
    /// JSON schema for tool arguments.
    pub parameter_schema: Value,
    /// Whether dispatch is enabled for this tool right now.
    pub enabled: bool,
    /// Whether execution needs explicit user approval.
    pub requires_confirmation: bool,
}

/// Interface for executable tools.
#[async_trait]
pub trait Tool: Send + Sync + Debug {
    /// Return the tool name.
    fn name(&self) -> &str;
    /// Return the tool description.
    fn description(&self) -> &str;
    /// Return the JSON schema for tool arguments.
    fn parameter_schema(&self) -> Value;

    /// Whether execution needs explicit user approval (destructive
    /// actions: deletion, sending email, blocked shell patterns).
    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Named exclusive resource this tool needs held across its call
    /// (e.g. "browser", "terminal:main"), if any.
    fn resource(&self) -> Option<String> {
        None
    }

    /// Execute the tool with validated arguments.
    async fn execute(&self, args: Value) -> Result<String, ToolError>;
}
