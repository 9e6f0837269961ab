//! Orchestration core: the agent turn loop, session persistence, and the
//! durable task scheduler, behind a single [`Orchestrator`] facade.
//!
//! Clients feed [`minder_protocol::SubmissionPayload`] submissions in and
//! consume [`minder_protocol::EventMsg`] events out; everything else
//! (model routing, memory, tool dispatch) happens behind the facade.

mod agent;
mod error;
mod orchestrator;
mod prompt;
mod sessions;
mod state;
pub mod tasks;
mod types;

pub use agent::{TurnExecutor, TurnOutcome};
pub use error::CoreError;
pub use orchestrator::{EventBus, Orchestrator};
pub use prompt::{PromptInputs, build_request, build_system_prompt};
pub use sessions::SessionStore;
pub use state::{JsonlStateStore, SessionRecord, SessionSummaryRecord, StateError, StateStore};
pub use tasks::{Schedule, ScheduleSpec, Task, TaskFilter, TaskStatus, TaskStore};
pub use types::{Session, SessionSummary};
