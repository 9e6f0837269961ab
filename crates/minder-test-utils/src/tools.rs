//! Stub tools exercising each branch of the dispatch pipeline.

use async_trait::async_trait;
use minder_protocol::ToolError;
use minder_tools::Tool;
use serde_json::{Value, json};
use std::time::Duration;

/// Returns its "text" argument unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the provided text back"
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"],
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        Ok(args["text"].as_str().unwrap_or_default().to_string())
    }
}

/// Always fails with an execution error.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameter_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> Result<String, ToolError> {
        Err(ToolError::ExecutionFailed("intentional failure".to_string()))
    }
}

/// Requires user confirmation before executing.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfirmTool;

#[async_trait]
impl Tool for ConfirmTool {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Pretend to send an email (destructive, gated)"
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "to": { "type": "string" } },
            "required": ["to"],
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        Ok(format!("sent to {}", args["to"].as_str().unwrap_or_default()))
    }
}

/// Holds a named exclusive resource for a configurable duration.
#[derive(Debug, Clone)]
pub struct ResourceTool {
    name: String,
    resource: String,
    hold: Duration,
}

impl ResourceTool {
    pub fn new(name: &str, resource: &str, hold: Duration) -> Self {
        Self {
            name: name.to_string(),
            resource: resource.to_string(),
            hold,
        }
    }
}

#[async_trait]
impl Tool for ResourceTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Occupies a shared resource for a while"
    }

    fn parameter_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn resource(&self) -> Option<String> {
        Some(self.resource.clone())
    }

    async fn execute(&self, _args: Value) -> Result<String, ToolError> {
        tokio::time::sleep(self.hold).await;
        Ok(format!("{} done", self.name))
    }
}

/// Sleeps longer than any sensible tool timeout.
#[derive(Debug, Clone, Copy)]
pub struct SlowTool {
    pub delay: Duration,
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Sleeps for a configured duration"
    }

    fn parameter_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> Result<String, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok("finally".to_string())
    }
}
