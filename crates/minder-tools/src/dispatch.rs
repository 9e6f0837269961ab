//! Tool dispatch pipeline.
//!
//! Ordered checks for every invocation: unknown/disabled, schema
//! validation, the non-bypassable denylist, confirmation gating, resource
//! locking, then the timed handler call.

use crate::confirm::ConfirmationBroker;
use crate::denylist::check_denylist;
use crate::locks::ResourceLocks;
use crate::registry::ToolRegistry;
use crate::validate::validate_arguments;
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::{debug, info, warn};
use minder_config::{SafetyConfig, SchedulerConfig};
use minder_protocol::{
    ApprovalDecision, EventMsg, EventPayload, EventSink, SessionId, ToolCallId, ToolError, TurnId,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Where an invocation came from, which decides how confirmation gating
/// resolves without a live user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOrigin {
    /// A live chat session that can answer confirmation requests.
    Interactive,
    /// A scheduler-fired task run with no controlling connection.
    Headless,
}

/// Identity and event plumbing for one invocation.
#[derive(Clone)]
pub struct DispatchContext {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub origin: CallOrigin,
    pub sink: Arc<dyn EventSink>,
}

/// Executes tool calls against the registry with safety gating.
pub struct ToolDispatcher {
    registry: ToolRegistry,
    broker: Arc<ConfirmationBroker>,
    locks: ResourceLocks,
    blocked_commands: Vec<String>,
    require_confirmation: bool,
    confirmation_timeout: Duration,
    lock_timeout: Duration,
    tool_timeout: Duration,
    headless_allow: GlobSet,
}

impl ToolDispatcher {
    /// Build a dispatcher from the safety and scheduler configuration.
    pub fn new(
        registry: ToolRegistry,
        safety: &SafetyConfig,
        scheduler: &SchedulerConfig,
        tool_timeout: Duration,
    ) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &scheduler.headless_allow {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            registry,
            broker: Arc::new(ConfirmationBroker::new()),
            locks: ResourceLocks::new(),
            blocked_commands: safety.blocked_commands.clone(),
            require_confirmation: safety.require_confirmation,
            confirmation_timeout: Duration::from_secs(safety.confirmation_timeout_secs),
            lock_timeout: Duration::from_secs(safety.resource_lock_timeout_secs),
            tool_timeout,
            headless_allow: builder.build()?,
        })
    }

    /// The registry this dispatcher serves.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Resolve a pending confirmation by request id.
    pub fn resolve_confirmation(&self, request_id: Uuid, decision: ApprovalDecision) -> bool {
        self.broker.resolve(request_id, decision)
    }

    /// Run the dispatch protocol for one tool call.
    pub async fn invoke(
        &self,
        ctx: &DispatchContext,
        tool_name: &str,
        arguments: Value,
    ) -> Result<String, ToolError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;
        if !self.registry.is_enabled(tool_name) {
            return Err(ToolError::Disabled(tool_name.to_string()));
        }

        validate_arguments(tool_name, &tool.parameter_schema(), &arguments)?;

        // never bypassable, regardless of confirmation or approval state
        check_denylist(tool_name, &self.blocked_commands, &arguments)?;

        if tool.requires_confirmation() && self.require_confirmation {
            self.confirm(ctx, tool_name, &arguments).await?;
        }

        // hold the guard across the handler call only
        let _guard = match tool.resource() {
            Some(resource) => Some(self.locks.acquire(&resource, self.lock_timeout).await?),
            None => None,
        };

        debug!(
            "executing tool (name={}, session_id={}, turn_id={})",
            tool_name, ctx.session_id, ctx.turn_id
        );
        match tokio::time::timeout(self.tool_timeout, tool.execute(arguments)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => {
                warn!(
                    "tool failed (name={}, kind={}, session_id={})",
                    tool_name,
                    err.kind(),
                    ctx.session_id
                );
                Err(err)
            }
            Err(_) => Err(ToolError::ExecutionFailed(format!(
                "{tool_name}: timed out after {}s",
                self.tool_timeout.as_secs()
            ))),
        }
    }

    /// Suspend on a confirmation request until approval, denial, or
    /// timeout. Headless runs are auto-denied unless allowlisted.
    async fn confirm(
        &self,
        ctx: &DispatchContext,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<(), ToolError> {
        if ctx.origin == CallOrigin::Headless {
            if self.headless_allow.is_match(tool_name) {
                info!(
                    "headless call allowlisted, skipping confirmation (tool={})",
                    tool_name
                );
                return Ok(());
            }
            return Err(ToolError::Denied(format!(
                "{tool_name}: confirmation required but no user is connected"
            )));
        }

        let (request_id, receiver) = self.broker.begin();
        ctx.sink.emit(EventMsg::new(
            ctx.session_id,
            EventPayload::ConfirmationRequested {
                turn_id: ctx.turn_id,
                request_id,
                tool_name: tool_name.to_string(),
                arguments: arguments.clone(),
            },
        ));

        let decision = self
            .broker
            .wait(request_id, receiver, self.confirmation_timeout)
            .await;
        ctx.sink.emit(EventMsg::new(
            ctx.session_id,
            EventPayload::ConfirmationResolved {
                turn_id: ctx.turn_id,
                request_id,
                decision,
            },
        ));

        match decision {
            ApprovalDecision::Approve => Ok(()),
            ApprovalDecision::Deny => Err(ToolError::Denied(format!(
                "{tool_name}: user denied the request"
            ))),
        }
    }
}

/// Fresh tool call id for event correlation.
pub fn new_tool_call_id() -> ToolCallId {
    Uuid::new_v4()
}
