use thiserror::Error;

/// Errors raised by memory storage and recall.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Filesystem access failed.
    #[error("memory io error: {0}")]
    Io(#[from] std::io::Error),
    /// Record encoding or decoding failed.
    #[error("memory serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Profile database access failed.
    #[error("profile store error: {0}")]
    Profile(#[from] rusqlite::Error),
    /// A stored row no longer parses back into its typed form.
    #[error("corrupt memory row: {0}")]
    Corrupt(String),
}
