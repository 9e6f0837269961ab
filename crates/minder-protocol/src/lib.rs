//! Wire protocol types for minder events, submissions, and common types.

mod tool;

pub use tool::ToolError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for a session.
pub type SessionId = Uuid;
/// Unique identifier for a turn.
pub type TurnId = Uuid;
/// Unique identifier for a tool call.
pub type ToolCallId = Uuid;
/// Unique identifier for a scheduled task.
pub type TaskId = Uuid;

/// Author of a message within a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System preamble.
    System,
    /// End user input.
    User,
    /// Model output.
    Assistant,
    /// Tool observation fed back into the loop.
    Tool,
}

impl Role {
    /// Stable string form used in persistence and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A single conversational message. Immutable once appended; ordering
/// within a session is the causal order of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Provider-reported or estimated (4 chars/token) token count.
    pub token_count: u64,
}

impl Message {
    /// Build a message stamped now, with an estimated token count.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        let token_count = content.len().div_ceil(4) as u64;
        Self {
            role,
            content,
            created_at: Utc::now(),
            token_count,
        }
    }
}

/// Wrapper for client submissions into the submission queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionEnvelope {
    /// Unique id for the submission.
    pub id: Uuid,
    /// Session id for the submission.
    pub session_id: SessionId,
    /// Timestamp when the submission was created.
    pub created_at: DateTime<Utc>,
    /// Submission payload content.
    pub payload: SubmissionPayload,
}

/// All submission operations that a client can enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum SubmissionPayload {
    /// Submit a user message to start a turn.
    Message { content: String },
    /// Enable or disable a registered tool at runtime.
    ToggleTool { tool_name: String, enabled: bool },
    /// Override the session's provider/model selection.
    Config {
        #[serde(default)]
        provider: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    /// Resolve a pending confirmation request.
    Confirm {
        request_id: Uuid,
        decision: ApprovalDecision,
    },
}

/// Wrapper for events emitted to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMsg {
    /// Unique id for the event.
    pub id: Uuid,
    /// Session id associated with the event.
    pub session_id: SessionId,
    /// Timestamp when the event was created.
    pub created_at: DateTime<Utc>,
    /// Event payload content.
    pub payload: EventPayload,
}

impl EventMsg {
    /// Build an event for a session with a fresh id and timestamp.
    pub fn new(session_id: SessionId, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            created_at: Utc::now(),
            payload,
        }
    }
}

/// All events emitted during orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum EventPayload {
    /// The agent is working on a turn.
    Typing { turn_id: TurnId },
    /// Human-readable progress line (thinking, executing a tool, waiting).
    Status { turn_id: TurnId, text: String },
    /// A message was appended to the session.
    Message { role: Role, content: String },
    /// A tool call finished, successfully or not.
    ToolResult {
        turn_id: TurnId,
        tool_call_id: ToolCallId,
        tool_name: String,
        result: Value,
        success: bool,
    },
    /// Token accounting for one provider call.
    Usage {
        turn_id: TurnId,
        input_tokens: u64,
        output_tokens: u64,
        model: String,
    },
    /// Confirmation requested for a gated tool call.
    ConfirmationRequested {
        turn_id: TurnId,
        request_id: Uuid,
        tool_name: String,
        arguments: Value,
    },
    /// A pending confirmation was resolved.
    ConfirmationResolved {
        turn_id: TurnId,
        request_id: Uuid,
        decision: ApprovalDecision,
    },
    /// Error surfaced to the user; the session stays usable.
    Error {
        turn_id: Option<TurnId>,
        content: String,
    },
    /// The turn reached a terminal state.
    Done { turn_id: TurnId },
}

/// Decision returned by a user for a pending confirmation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Allow the gated call to proceed.
    Approve,
    /// Refuse the gated call.
    Deny,
}

/// Sink interface for orchestrator and tool events.
pub trait EventSink: Send + Sync {
    /// Emit an event to downstream listeners.
    fn emit(&self, event: EventMsg);
}

/// Sink that drops every event. Useful for tests and headless runs with no
/// observer attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: EventMsg) {}
}
