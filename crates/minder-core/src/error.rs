//! Error types for the core orchestration crate.

use minder_protocol::SessionId;
use thiserror::Error;

/// Errors returned by orchestrator operations.
///
/// Tool failures never appear here: they are absorbed into the
/// conversation as observations so the model can re-plan.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Session id is unknown to the orchestrator.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    /// Provider failed after the retry budget was spent.
    #[error("provider error: {0}")]
    Provider(#[from] minder_router::ProviderError),
    /// Memory tier failure.
    #[error("memory error: {0}")]
    Memory(#[from] minder_memory::MemoryError),
    /// Session persistence failure.
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    /// A turn is already executing for this session and the lock wait
    /// timed out.
    #[error("session busy: {0}")]
    SessionBusy(SessionId),
    /// Task queue failure.
    #[error("task error: {0}")]
    Task(String),
    /// Task database failure.
    #[error("task store error: {0}")]
    TaskStore(#[from] rusqlite::Error),
    /// Invalid orchestrator configuration.
    #[error("config error: {0}")]
    Config(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
