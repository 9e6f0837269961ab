use serde::{Deserialize, Serialize};

/// Errors returned by tool dispatch and tool handlers.
///
/// Every variant is recoverable from the agent loop's point of view: a
/// failed dispatch becomes an observation the model can re-plan around,
/// never a fatal error.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ToolError {
    /// Tool name was not found in the registry.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// Tool exists but is currently disabled.
    #[error("tool disabled: {0}")]
    Disabled(String),
    /// Arguments failed validation against the tool's parameter schema.
    #[error("argument validation failed: {0}")]
    ValidationFailed(String),
    /// The tool handler ran and failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    /// The call was refused: blocked pattern, declined confirmation, or
    /// confirmation timeout.
    #[error("denied: {0}")]
    Denied(String),
}

impl ToolError {
    /// Stable kind label used in events and observations.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::Disabled(_) => "disabled",
            ToolError::ValidationFailed(_) => "validation_failed",
            ToolError::ExecutionFailed(_) => "execution_failed",
            ToolError::Denied(_) => "denied",
        }
    }
}
