//! Session persistence using JSONL rollouts.
//!
//! One file per session. The first line is a [`RolloutHeader`] carrying the
//! schema version and session metadata; every following line is a
//! [`RolloutItem`], either a conversation message or a provider usage
//! report. Listing sessions scans headers and counts lines without
//! materializing message bodies.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use minder_protocol::{Message, Role, SessionId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Rollout format version this build reads and writes.
const SUPPORTED_SCHEMA: u32 = 1;

/// Persisted session record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    /// Session identifier.
    pub id: SessionId,
    /// Owning user.
    pub user_id: String,
    /// Session creation timestamp.
    pub created_at: DateTime<Utc>,
    /// All messages in the session, in append order.
    pub messages: Vec<Message>,
    /// Provider-reported input tokens summed over the session's turns.
    pub input_tokens: u64,
    /// Provider-reported output tokens summed over the session's turns.
    pub output_tokens: u64,
}

/// Summary record used for listing sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummaryRecord {
    pub id: SessionId,
    pub user_id: String,
    pub message_count: usize,
    /// Input plus output tokens across the session.
    pub total_tokens: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistent store abstraction for sessions, messages, and usage.
pub trait StateStore: Send + Sync {
    /// Record a new session creation.
    fn record_session(
        &self,
        session_id: SessionId,
        user_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), StateError>;
    /// Append a message to a session.
    fn append_message(&self, session_id: SessionId, message: &Message) -> Result<(), StateError>;
    /// Append a provider usage report to a session.
    fn append_usage(
        &self,
        session_id: SessionId,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<(), StateError>;
    /// Load a session record by id.
    fn load_session(&self, session_id: SessionId) -> Result<Option<SessionRecord>, StateError>;
    /// List all session summaries, most recently updated first.
    fn list_sessions(&self) -> Result<Vec<SessionSummaryRecord>, StateError>;
    /// Delete a session and its backing storage.
    fn delete_session(&self, session_id: SessionId) -> Result<bool, StateError>;
}

/// Errors returned by the state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u32),
    #[error("rollout has no header line: {0}")]
    MissingHeader(SessionId),
    #[error("session already exists: {0}")]
    SessionExists(SessionId),
}

/// First line of every rollout file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RolloutHeader {
    schema: u32,
    session_id: SessionId,
    user_id: String,
    created_at: DateTime<Utc>,
}

/// Every line after the header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RolloutItem {
    Message {
        role: Role,
        content: String,
        created_at: DateTime<Utc>,
        token_count: u64,
    },
    Usage {
        model: String,
        input_tokens: u64,
        output_tokens: u64,
        created_at: DateTime<Utc>,
    },
}

impl RolloutItem {
    fn created_at(&self) -> DateTime<Utc> {
        match self {
            RolloutItem::Message { created_at, .. } => *created_at,
            RolloutItem::Usage { created_at, .. } => *created_at,
        }
    }
}

/// JSONL-backed state store implementation, one rollout file per session.
pub struct JsonlStateStore {
    /// Root directory for session rollouts.
    root: PathBuf,
    /// Serialize write access to rollout files.
    write_lock: Mutex<()>,
}

impl JsonlStateStore {
    /// Create a new JSONL store under the given root.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StateError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized JSONL state store (root={})", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn rollout_path(&self, session_id: SessionId) -> PathBuf {
        self.root.join(format!("{session_id}.jsonl"))
    }

    /// Append an item line. The rollout must already exist; appending never
    /// creates a headerless file.
    fn write_item(&self, session_id: SessionId, item: &RolloutItem) -> Result<(), StateError> {
        let _guard = self.write_lock.lock();
        let path = self.rollout_path(session_id);
        let mut file = OpenOptions::new().append(true).open(path)?;
        let line = serde_json::to_string(item)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn write_header(&self, header: &RolloutHeader) -> Result<(), StateError> {
        let _guard = self.write_lock.lock();
        let path = self.rollout_path(header.session_id);
        if path.exists() {
            return Err(StateError::SessionExists(header.session_id));
        }
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        let line = serde_json::to_string(header)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Open a rollout and parse its header, leaving the reader positioned
    /// at the first item line.
    fn open_rollout(
        &self,
        session_id: SessionId,
    ) -> Result<Option<(RolloutHeader, Lines<BufReader<File>>)>, StateError> {
        let path = self.rollout_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let file = OpenOptions::new().read(true).open(&path)?;
        let mut lines = BufReader::new(file).lines();
        let header_line = loop {
            match lines.next() {
                Some(line) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Err(StateError::MissingHeader(session_id)),
            }
        };
        let header: RolloutHeader = serde_json::from_str(&header_line)
            .map_err(|_| StateError::MissingHeader(session_id))?;
        if header.schema > SUPPORTED_SCHEMA {
            return Err(StateError::UnsupportedSchema(header.schema));
        }
        Ok(Some((header, lines)))
    }

    /// Summarize one rollout without materializing its message bodies.
    fn scan_summary(
        &self,
        session_id: SessionId,
    ) -> Result<Option<SessionSummaryRecord>, StateError> {
        let Some((header, lines)) = self.open_rollout(session_id)? else {
            return Ok(None);
        };
        let mut message_count = 0usize;
        let mut total_tokens = 0u64;
        let mut updated_at = header.created_at;
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let item: RolloutItem = serde_json::from_str(&line)?;
            updated_at = item.created_at();
            match item {
                RolloutItem::Message { .. } => message_count += 1,
                RolloutItem::Usage {
                    input_tokens,
                    output_tokens,
                    ..
                } => total_tokens += input_tokens + output_tokens,
            }
        }
        Ok(Some(SessionSummaryRecord {
            id: header.session_id,
            user_id: header.user_id,
            message_count,
            total_tokens,
            created_at: header.created_at,
            updated_at,
        }))
    }
}

impl StateStore for JsonlStateStore {
    fn record_session(
        &self,
        session_id: SessionId,
        user_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        info!(
            "recording session creation (session_id={}, user_id={})",
            session_id, user_id
        );
        self.write_header(&RolloutHeader {
            schema: SUPPORTED_SCHEMA,
            session_id,
            user_id: user_id.to_string(),
            created_at,
        })
    }

    fn append_message(&self, session_id: SessionId, message: &Message) -> Result<(), StateError> {
        debug!(
            "appending message line (session_id={}, role={}, content_len={})",
            session_id,
            message.role.as_str(),
            message.content.len()
        );
        self.write_item(
            session_id,
            &RolloutItem::Message {
                role: message.role,
                content: message.content.clone(),
                created_at: message.created_at,
                token_count: message.token_count,
            },
        )
    }

    fn append_usage(
        &self,
        session_id: SessionId,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<(), StateError> {
        debug!(
            "appending usage line (session_id={}, model={}, in={}, out={})",
            session_id, model, input_tokens, output_tokens
        );
        self.write_item(
            session_id,
            &RolloutItem::Usage {
                model: model.to_string(),
                input_tokens,
                output_tokens,
                created_at: Utc::now(),
            },
        )
    }

    fn load_session(&self, session_id: SessionId) -> Result<Option<SessionRecord>, StateError> {
        let Some((header, lines)) = self.open_rollout(session_id)? else {
            return Ok(None);
        };
        let mut record = SessionRecord {
            id: header.session_id,
            user_id: header.user_id,
            created_at: header.created_at,
            messages: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
        };
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line)? {
                RolloutItem::Message {
                    role,
                    content,
                    created_at,
                    token_count,
                } => record.messages.push(Message {
                    role,
                    content,
                    created_at,
                    token_count,
                }),
                RolloutItem::Usage {
                    input_tokens,
                    output_tokens,
                    ..
                } => {
                    record.input_tokens += input_tokens;
                    record.output_tokens += output_tokens;
                }
            }
        }
        Ok(Some(record))
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummaryRecord>, StateError> {
        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            let file_name = match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(name) => name,
                None => continue,
            };
            let session_id = match Uuid::parse_str(file_name) {
                Ok(id) => id,
                Err(_) => continue,
            };
            if let Some(summary) = self.scan_summary(session_id)? {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn delete_session(&self, session_id: SessionId) -> Result<bool, StateError> {
        let path = self.rollout_path(session_id);
        if path.exists() {
            info!("deleting session rollout (session_id={})", session_id);
            fs::remove_file(path)?;
            Ok(true)
        } else {
            warn!("session rollout not found (session_id={})", session_id);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonlStateStore, SessionRecord, SessionSummaryRecord, StateError, StateStore};
    use minder_protocol::{Message, Role};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[test]
    fn rollout_round_trips_messages_and_usage() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStateStore::new(temp.path()).expect("store");
        let session_id = Uuid::new_v4();
        let question = Message::new(Role::User, "hello");
        let answer = Message::new(Role::Assistant, "hi there");
        let created_at = question.created_at;

        store
            .record_session(session_id, "default", created_at)
            .expect("record session");
        store
            .append_message(session_id, &question)
            .expect("append question");
        store
            .append_usage(session_id, "test-model", 12, 7)
            .expect("append usage");
        store
            .append_message(session_id, &answer)
            .expect("append answer");

        let record = store
            .load_session(session_id)
            .expect("load")
            .expect("record");
        let expected = SessionRecord {
            id: session_id,
            user_id: "default".to_string(),
            created_at,
            messages: vec![question, answer],
            input_tokens: 12,
            output_tokens: 7,
        };
        assert_eq!(record, expected);

        assert!(store.delete_session(session_id).expect("delete"));
        assert_eq!(
            store.load_session(session_id).expect("load after delete"),
            None
        );
    }

    #[test]
    fn listing_counts_messages_and_sums_tokens_without_loading_bodies() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStateStore::new(temp.path()).expect("store");
        let session_id = Uuid::new_v4();
        let message = Message::new(Role::User, "what's the plan?");

        store
            .record_session(session_id, "default", message.created_at)
            .expect("record session");
        store
            .append_message(session_id, &message)
            .expect("append message");
        store
            .append_usage(session_id, "test-model", 30, 10)
            .expect("first usage");
        store
            .append_usage(session_id, "test-model", 20, 5)
            .expect("second usage");

        let summaries = store.list_sessions().expect("summaries");
        let expected = SessionSummaryRecord {
            id: session_id,
            user_id: "default".to_string(),
            message_count: 1,
            total_tokens: 65,
            created_at: message.created_at,
            updated_at: summaries[0].updated_at,
        };
        assert_eq!(summaries, vec![expected]);
        assert!(summaries[0].updated_at >= message.created_at);
    }

    #[test]
    fn duplicate_session_creation_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStateStore::new(temp.path()).expect("store");
        let session_id = Uuid::new_v4();
        let now = chrono::Utc::now();
        store
            .record_session(session_id, "default", now)
            .expect("first");
        store
            .record_session(session_id, "default", now)
            .expect_err("duplicate");
    }

    #[test]
    fn headerless_rollout_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStateStore::new(temp.path()).expect("store");
        let session_id = Uuid::new_v4();
        let item = r#"{"type":"message","role":"user","content":"hi","created_at":"2026-01-01T00:00:00Z","token_count":1}"#;
        fs::write(temp.path().join(format!("{session_id}.jsonl")), item).expect("write rollout");

        let err = store.load_session(session_id).expect_err("no header");
        assert!(matches!(err, StateError::MissingHeader(id) if id == session_id));
    }

    #[test]
    fn newer_schema_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStateStore::new(temp.path()).expect("store");
        let session_id = Uuid::new_v4();
        let header = format!(
            r#"{{"schema":2,"session_id":"{session_id}","user_id":"default","created_at":"2026-01-01T00:00:00Z"}}"#
        );
        fs::write(temp.path().join(format!("{session_id}.jsonl")), header).expect("write rollout");

        let err = store.load_session(session_id).expect_err("future schema");
        assert!(matches!(err, StateError::UnsupportedSchema(2)));
    }

    #[test]
    fn appending_to_a_deleted_rollout_fails() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStateStore::new(temp.path()).expect("store");
        let session_id = Uuid::new_v4();
        store
            .record_session(session_id, "default", chrono::Utc::now())
            .expect("record session");
        assert!(store.delete_session(session_id).expect("delete"));

        let err = store
            .append_message(session_id, &Message::new(Role::User, "orphan"))
            .expect_err("no rollout to append to");
        assert!(matches!(err, StateError::Io(_)));
    }
}
