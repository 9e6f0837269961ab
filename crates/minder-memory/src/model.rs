//! Persisted memory data model.

use chrono::{DateTime, Utc};
use minder_protocol::SessionId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A summarized, embedded fragment of older conversation retained for
/// semantic recall. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    /// Record identifier.
    pub id: Uuid,
    /// Session the summarized messages came from.
    pub source_session_id: SessionId,
    /// Compressed text covering the evicted block.
    pub summary_text: String,
    /// L2-normalized embedding of the summary.
    pub embedding: Vec<f32>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One key/value fact about the user. Last write wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfileFact {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
