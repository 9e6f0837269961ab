//! Memory manager tying the three tiers together.

use crate::embed::{EMBEDDING_DIM, Embedder, HashEmbedder};
use crate::error::MemoryError;
use crate::model::{MemoryRecord, UserProfileFact};
use crate::recall::rank_records;
use crate::store::RecordStore;
use crate::summarize::{EMBED_CHARS, ExtractiveSummarizer, Summarizer};
use chrono::Utc;
use log::{debug, info};
use minder_protocol::{Message, SessionId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Context assembled for one model call.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    /// Top-k long-term records relevant to the query, best first.
    pub records: Vec<MemoryRecord>,
    /// Live short-term buffer for the session, oldest first.
    pub short_term: Vec<Message>,
    /// User profile facts, ordered by key.
    pub profile: BTreeMap<String, String>,
}

/// Maintains the short-term buffer, long-term summarized records, and the
/// user profile.
///
/// The short-term buffer never exceeds `max_short_term`; every eviction
/// writes exactly one [`MemoryRecord`] covering the evicted block before
/// the messages are dropped.
pub struct MemoryManager {
    buffers: Mutex<HashMap<SessionId, VecDeque<Message>>>,
    store: RecordStore,
    profile: crate::profile::ProfileStore,
    embedder: Arc<dyn Embedder>,
    summarizer: Arc<dyn Summarizer>,
    max_short_term: usize,
    summary_max_chars: usize,
}

impl MemoryManager {
    /// Create a manager with file-backed records under `root` and the
    /// profile database beside them.
    pub fn new(
        root: impl AsRef<Path>,
        max_short_term: usize,
        summary_max_chars: usize,
    ) -> Result<Self, MemoryError> {
        let root = root.as_ref();
        let store = RecordStore::new(root)?;
        let profile = crate::profile::ProfileStore::open(root.join("profile.sqlite"))?;
        Ok(Self {
            buffers: Mutex::new(HashMap::new()),
            store,
            profile,
            embedder: Arc::new(HashEmbedder),
            summarizer: Arc::new(ExtractiveSummarizer),
            max_short_term: max_short_term.max(1),
            summary_max_chars,
        })
    }

    /// Swap in a different summarizer (e.g. a model-backed one).
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Swap in a different embedder.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Append a message to the session's short-term buffer, evicting and
    /// summarizing the oldest block when the bound is exceeded.
    ///
    /// Returns the record written for the evicted block, if any.
    pub fn append(
        &self,
        session_id: SessionId,
        message: Message,
    ) -> Result<Option<MemoryRecord>, MemoryError> {
        let evicted: Vec<Message> = {
            let mut buffers = self.buffers.lock();
            let buffer = buffers.entry(session_id).or_default();
            buffer.push_back(message);
            let overflow = buffer.len().saturating_sub(self.max_short_term);
            buffer.drain(..overflow).collect()
        };
        if evicted.is_empty() {
            return Ok(None);
        }

        let summary_text = self.summarizer.summarize(&evicted, self.summary_max_chars);
        let embed_input: String = summary_text.chars().take(EMBED_CHARS).collect();
        let record = MemoryRecord {
            id: Uuid::new_v4(),
            source_session_id: session_id,
            summary_text,
            embedding: self.embedder.embed(&embed_input),
            created_at: Utc::now(),
        };
        self.store.append(&record)?;
        info!(
            "evicted short-term block (session_id={}, evicted={}, record_id={})",
            session_id,
            evicted.len(),
            record.id
        );
        Ok(Some(record))
    }

    /// Build the context for one model call: top-k relevant records, the
    /// live short-term buffer, and the user's profile facts.
    ///
    /// Deterministic for identical inputs at a fixed point in time; a new
    /// retrieval reflects newly written records.
    pub fn retrieve(
        &self,
        session_id: SessionId,
        user_id: &str,
        query_text: &str,
        k: usize,
    ) -> Result<RetrievedContext, MemoryError> {
        let records = self.store.load()?;
        let query_embedding = self.embedder.embed(query_text);
        let records = rank_records(records, &query_embedding, query_text, k);
        let short_term = self.short_term(session_id);
        let profile = self.profile.get_profile(user_id)?;
        debug!(
            "retrieved context (session_id={}, records={}, short_term={}, profile_facts={})",
            session_id,
            records.len(),
            short_term.len(),
            profile.len()
        );
        Ok(RetrievedContext {
            records,
            short_term,
            profile,
        })
    }

    /// Current short-term buffer contents, oldest first.
    pub fn short_term(&self, session_id: SessionId) -> Vec<Message> {
        self.buffers
            .lock()
            .get(&session_id)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Current short-term buffer length.
    pub fn short_term_len(&self, session_id: SessionId) -> usize {
        self.buffers
            .lock()
            .get(&session_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Seed a session's buffer from persisted history, applying the same
    /// bound without summarizing (the history was already persisted).
    pub fn seed(&self, session_id: SessionId, messages: Vec<Message>) {
        let start = messages.len().saturating_sub(self.max_short_term);
        let mut buffers = self.buffers.lock();
        buffers.insert(session_id, messages[start..].iter().cloned().collect());
    }

    /// Drop a session's short-term buffer (e.g. after disconnect).
    pub fn forget_session(&self, session_id: SessionId) {
        self.buffers.lock().remove(&session_id);
    }

    /// Delete every long-term record distilled from a session, returning
    /// how many were removed. Used when the session itself is deleted so
    /// nothing summarized from it lingers in recall.
    pub fn purge_session_records(&self, session_id: SessionId) -> Result<usize, MemoryError> {
        let records = self.store.load()?;
        let before = records.len();
        let kept: Vec<MemoryRecord> = records
            .into_iter()
            .filter(|record| record.source_session_id != session_id)
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.store.rewrite(&kept)?;
            info!(
                "purged session records (session_id={}, removed={})",
                session_id, removed
            );
        }
        Ok(removed)
    }

    /// All profile facts for a user.
    pub fn get_profile(&self, user_id: &str) -> Result<BTreeMap<String, String>, MemoryError> {
        self.profile.get_profile(user_id)
    }

    /// One profile fact with its update timestamp, if present.
    pub fn get_profile_fact(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<UserProfileFact>, MemoryError> {
        self.profile.get_fact(user_id, key)
    }

    /// Set one profile fact. Last write wins.
    pub fn set_profile_fact(
        &self,
        user_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MemoryError> {
        self.profile.set_fact(user_id, key, value)
    }

    /// Dimension of record embeddings (for diagnostics).
    pub fn embedding_dim(&self) -> usize {
        EMBEDDING_DIM
    }
}
