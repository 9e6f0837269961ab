//! Session cache, persistence wiring, and per-session execution locks.

use crate::error::CoreError;
use crate::state::{SessionSummaryRecord, StateStore};
use crate::types::{Session, SessionSummary};
use log::{debug, info};
use minder_protocol::{Message, SessionId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// In-memory session cache over an optional persistent store.
///
/// Also owns the per-session execution locks: a session may not have two
/// agent loop instances executing concurrently, so a new message arriving
/// mid-turn queues on the lock instead of interleaving.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    turn_locks: Arc<Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>>,
    state: Option<Arc<dyn StateStore>>,
}

impl SessionStore {
    pub fn new(state: Option<Arc<dyn StateStore>>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            turn_locks: Arc::new(Mutex::new(HashMap::new())),
            state,
        }
    }

    /// Create a new session and record it if persistence is enabled.
    pub fn create(&self, user_id: &str) -> Result<Session, CoreError> {
        let session = Session::new(user_id);
        if let Some(state) = &self.state {
            state.record_session(session.id, user_id, session.created_at)?;
        }
        info!(
            "session created (session_id={}, user_id={})",
            session.id, user_id
        );
        self.sessions.write().insert(session.id, session.clone());
        Ok(session)
    }

    /// Resume a persisted session, returning it with its message history.
    pub fn resume(&self, session_id: SessionId) -> Result<(Session, Vec<Message>), CoreError> {
        if let Some(session) = self.sessions.read().get(&session_id).cloned() {
            // already cached; history lives in the memory manager
            return Ok((session, Vec::new()));
        }
        let Some(state) = &self.state else {
            return Err(CoreError::UnknownSession(session_id));
        };
        let record = state
            .load_session(session_id)?
            .ok_or(CoreError::UnknownSession(session_id))?;
        let session = Session {
            id: record.id,
            user_id: record.user_id,
            provider: None,
            model: None,
            created_at: record.created_at,
        };
        info!(
            "session resumed (session_id={}, messages={})",
            session_id,
            record.messages.len()
        );
        self.sessions.write().insert(session_id, session.clone());
        Ok((session, record.messages))
    }

    /// Fetch a cached session.
    pub fn get(&self, session_id: SessionId) -> Result<Session, CoreError> {
        self.sessions
            .read()
            .get(&session_id)
            .cloned()
            .ok_or(CoreError::UnknownSession(session_id))
    }

    /// Update the provider/model overrides on a cached session.
    pub fn configure(
        &self,
        session_id: SessionId,
        provider: Option<String>,
        model: Option<String>,
    ) -> Result<Session, CoreError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&session_id)
            .ok_or(CoreError::UnknownSession(session_id))?;
        if provider.is_some() {
            session.provider = provider;
        }
        if model.is_some() {
            session.model = model;
        }
        debug!(
            "session configured (session_id={}, provider={:?}, model={:?})",
            session_id, session.provider, session.model
        );
        Ok(session.clone())
    }

    /// Append a message to the persisted history.
    pub fn append_message(
        &self,
        session_id: SessionId,
        message: &Message,
    ) -> Result<(), CoreError> {
        if let Some(state) = &self.state {
            state.append_message(session_id, message)?;
        }
        Ok(())
    }

    /// Append a provider usage report to the persisted history.
    pub fn append_usage(
        &self,
        session_id: SessionId,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<(), CoreError> {
        if let Some(state) = &self.state {
            state.append_usage(session_id, model, input_tokens, output_tokens)?;
        }
        Ok(())
    }

    /// List persisted sessions, most recently updated first.
    pub fn list(&self) -> Result<Vec<SessionSummary>, CoreError> {
        let Some(state) = &self.state else {
            let sessions = self.sessions.read();
            let mut summaries: Vec<SessionSummary> = sessions
                .values()
                .map(|s| SessionSummary {
                    id: s.id,
                    user_id: s.user_id.clone(),
                    message_count: 0,
                    total_tokens: 0,
                    created_at: s.created_at,
                    updated_at: s.created_at,
                })
                .collect();
            summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            return Ok(summaries);
        };
        Ok(state
            .list_sessions()?
            .into_iter()
            .map(summary_from_record)
            .collect())
    }

    /// Delete a session from the cache and from persistence.
    pub fn delete(&self, session_id: SessionId) -> Result<bool, CoreError> {
        let cached = self.sessions.write().remove(&session_id).is_some();
        self.turn_locks.lock().remove(&session_id);
        let persisted = match &self.state {
            Some(state) => state.delete_session(session_id)?,
            None => false,
        };
        Ok(cached || persisted)
    }

    /// Acquire the session's execution lock, waiting at most `timeout`.
    pub async fn acquire_turn_lock(
        &self,
        session_id: SessionId,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, CoreError> {
        let lock = self
            .turn_locks
            .lock()
            .entry(session_id)
            .or_default()
            .clone();
        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(CoreError::SessionBusy(session_id)),
        }
    }
}

fn summary_from_record(record: SessionSummaryRecord) -> SessionSummary {
    SessionSummary {
        id: record.id,
        user_id: record.user_id,
        message_count: record.message_count,
        total_tokens: record.total_tokens,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}
