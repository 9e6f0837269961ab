//! Core session types.

use chrono::{DateTime, Utc};
use minder_protocol::SessionId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A live conversation. Owns its message sequence exclusively while
/// connected; persisted messages outlive the connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// Owning user.
    pub user_id: String,
    /// Provider override for this session, if any.
    pub provider: Option<String>,
    /// Model name override for this session, if any.
    pub model: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// New session for a user with no overrides.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            provider: None,
            model: None,
            created_at: Utc::now(),
        }
    }
}

/// Listing entry for persisted sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub user_id: String,
    pub message_count: usize,
    /// Provider-reported tokens (input plus output) spent in the session.
    pub total_tokens: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
