//! Orchestrator facade: wires the router, memory, tools, sessions, and
//! the task scheduler behind one submission/event surface.

use crate::agent::{TurnExecutor, TurnOutcome};
use crate::error::CoreError;
use crate::sessions::SessionStore;
use crate::state::JsonlStateStore;
use crate::tasks::{Schedule, Task, TaskFilter, TaskStore};
use crate::types::{Session, SessionSummary};
use chrono::{DateTime, Utc};
use log::{info, warn};
use minder_config::MinderConfig;
use minder_memory::{MemoryManager, UserProfileFact};
use minder_protocol::{
    EventMsg, EventPayload, EventSink, SessionId, SubmissionEnvelope, SubmissionPayload, TaskId,
};
use minder_router::{ChatProvider, ModelRouter};
use minder_tools::{CallOrigin, Tool, ToolDispatcher, ToolRegistry};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Buffered events per subscriber before lagging drops the oldest.
const EVENT_BUS_CAPACITY: usize = 256;

/// Fan-out event channel. Every emitted event reaches every live
/// subscriber; a subscriber that falls behind loses oldest-first.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventMsg>,
}

impl EventBus {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventMsg> {
        self.sender.subscribe()
    }

    /// Subscribe as a `Stream`, for transports that consume streams.
    pub fn stream(&self) -> BroadcastStream<EventMsg> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: EventMsg) {
        // no subscribers is fine; events are advisory
        let _ = self.sender.send(event);
    }
}

/// The orchestration core. Owns every subsystem; clients interact through
/// submissions in and events out, plus direct task/session management.
pub struct Orchestrator {
    bus: EventBus,
    router: Arc<ModelRouter>,
    memory: Arc<MemoryManager>,
    dispatcher: Arc<ToolDispatcher>,
    sessions: SessionStore,
    tasks: TaskStore,
    executor: TurnExecutor,
    session_lock_timeout: Duration,
    tick_interval: Duration,
    scheduler_enabled: bool,
}

impl Orchestrator {
    /// Build against the platform data directory.
    pub fn new(config: MinderConfig) -> Result<Self, CoreError> {
        let root = directories::BaseDirs::new()
            .map(|dirs| dirs.data_dir().join("minder"))
            .ok_or_else(|| {
                CoreError::Config("could not determine a data directory".to_string())
            })?;
        Self::with_data_root(config, root)
    }

    /// Build with an explicit storage root. Config paths override the
    /// per-subsystem defaults under the root.
    pub fn with_data_root(config: MinderConfig, root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let memory_path = config
            .memory
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| root.join("memory"));
        let memory = Arc::new(MemoryManager::new(
            memory_path,
            config.memory.max_short_term,
            config.memory.summary_max_chars,
        )?);

        let sessions = if config.sessions.enabled {
            let sessions_path = config
                .sessions
                .path
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| root.join("sessions"));
            SessionStore::new(Some(Arc::new(JsonlStateStore::new(sessions_path)?)))
        } else {
            SessionStore::new(None)
        };

        let tasks_path = config
            .scheduler
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| root.join("tasks.sqlite"));
        let tasks = TaskStore::open(tasks_path)?;

        let router = Arc::new(ModelRouter::from_model_config(
            &config.model,
            config.agent.max_retries,
        ));
        let dispatcher = Arc::new(
            ToolDispatcher::new(
                ToolRegistry::new(),
                &config.safety,
                &config.scheduler,
                Duration::from_secs(config.agent.tool_timeout_secs),
            )
            .map_err(|err| CoreError::Config(err.to_string()))?,
        );

        let executor = TurnExecutor::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            Arc::clone(&dispatcher),
            sessions.clone(),
            config.model.name.clone(),
            config.model.temperature,
            config.model.max_tokens,
            config.agent.max_iterations,
            config.memory.recall_k,
        );

        info!("orchestrator ready (root={})", root.display());
        Ok(Self {
            bus: EventBus::new(),
            router,
            memory,
            dispatcher,
            sessions,
            tasks,
            executor,
            session_lock_timeout: Duration::from_secs(config.agent.session_lock_timeout_secs),
            tick_interval: Duration::from_secs(config.scheduler.tick_interval_secs),
            scheduler_enabled: config.scheduler.enabled,
        })
    }

    /// Subscribe to the orchestrator's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventMsg> {
        self.bus.subscribe()
    }

    /// Subscribe as a `Stream`.
    pub fn events(&self) -> BroadcastStream<EventMsg> {
        self.bus.stream()
    }

    /// Register an additional model provider.
    pub fn register_provider(&self, provider: Arc<dyn ChatProvider>) {
        self.router.register(provider);
    }

    /// Register a tool, enabled by default.
    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        self.dispatcher.registry().register(tool);
    }

    pub fn create_session(&self, user_id: &str) -> Result<Session, CoreError> {
        self.sessions.create(user_id)
    }

    /// Resume a persisted session, seeding the short-term buffer from the
    /// tail of its history.
    pub fn resume_session(&self, session_id: SessionId) -> Result<Session, CoreError> {
        let (session, history) = self.sessions.resume(session_id)?;
        if !history.is_empty() {
            self.memory.seed(session_id, history);
        }
        Ok(session)
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, CoreError> {
        self.sessions.list()
    }

    /// Delete a session: its rollout, its live buffer, and the long-term
    /// memory records distilled from it.
    pub fn delete_session(&self, session_id: SessionId) -> Result<bool, CoreError> {
        self.memory.forget_session(session_id);
        self.memory.purge_session_records(session_id)?;
        self.sessions.delete(session_id)
    }

    pub fn set_profile_fact(&self, user_id: &str, key: &str, value: &str) -> Result<(), CoreError> {
        Ok(self.memory.set_profile_fact(user_id, key, value)?)
    }

    pub fn get_profile(&self, user_id: &str) -> Result<BTreeMap<String, String>, CoreError> {
        Ok(self.memory.get_profile(user_id)?)
    }

    /// One profile fact with its update timestamp, if present.
    pub fn get_profile_fact(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<UserProfileFact>, CoreError> {
        Ok(self.memory.get_profile_fact(user_id, key)?)
    }

    /// Handle one client submission.
    pub async fn submit(&self, envelope: SubmissionEnvelope) -> Result<(), CoreError> {
        match envelope.payload {
            SubmissionPayload::Message { content } => {
                self.run_message(envelope.session_id, &content).await?;
                Ok(())
            }
            SubmissionPayload::ToggleTool { tool_name, enabled } => {
                if self.dispatcher.registry().set_enabled(&tool_name, enabled) {
                    info!("tool toggled (tool={}, enabled={})", tool_name, enabled);
                } else {
                    self.bus.emit(EventMsg::new(
                        envelope.session_id,
                        EventPayload::Error {
                            turn_id: None,
                            content: format!("unknown tool: {tool_name}"),
                        },
                    ));
                }
                Ok(())
            }
            SubmissionPayload::Config { provider, model } => {
                if let Some(provider) = &provider {
                    self.router.resolve_provider_id(Some(provider))?;
                }
                self.sessions.configure(envelope.session_id, provider, model)?;
                Ok(())
            }
            SubmissionPayload::Confirm {
                request_id,
                decision,
            } => {
                if !self.dispatcher.resolve_confirmation(request_id, decision) {
                    warn!(
                        "confirmation for unknown request (request_id={})",
                        request_id
                    );
                }
                Ok(())
            }
        }
    }

    /// Run one interactive turn under the session's execution lock.
    pub async fn run_message(
        &self,
        session_id: SessionId,
        content: &str,
    ) -> Result<TurnOutcome, CoreError> {
        let session = self.sessions.get(session_id)?;
        let _guard = self
            .sessions
            .acquire_turn_lock(session_id, self.session_lock_timeout)
            .await?;
        let active_tasks = self.tasks.count_active()?;
        self.executor
            .run_turn(
                &session,
                CallOrigin::Interactive,
                Arc::new(self.bus.clone()),
                content,
                active_tasks,
            )
            .await
    }

    pub fn add_task(
        &self,
        description: &str,
        priority: i64,
        schedule: Option<Schedule>,
        parent_id: Option<TaskId>,
    ) -> Result<Task, CoreError> {
        self.tasks.add(description, priority, schedule, parent_id, Utc::now())
    }

    pub fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, CoreError> {
        self.tasks.get(task_id)
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, CoreError> {
        self.tasks.list(filter)
    }

    pub fn cancel_task(&self, task_id: TaskId) -> Result<Task, CoreError> {
        self.tasks.cancel(task_id)
    }

    /// Delete a task and all of its subtasks.
    pub fn delete_task(&self, task_id: TaskId) -> Result<usize, CoreError> {
        self.tasks.delete(task_id)
    }

    /// Run every due task once. Each run gets a fresh headless session;
    /// confirmation-gated tools are auto-denied unless allowlisted.
    ///
    /// One failing task never blocks the others.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, CoreError> {
        let due = self.tasks.due(now)?;
        let mut fired = 0;
        for task in due {
            let task = self.tasks.mark_fired(task.id, now)?;
            fired += 1;
            info!(
                "firing scheduled task (task_id={}, description={})",
                task.id, task.description
            );
            let session = self.sessions.create("scheduler")?;
            let outcome = self
                .executor
                .run_turn(
                    &session,
                    CallOrigin::Headless,
                    Arc::new(self.bus.clone()),
                    &task.description,
                    self.tasks.count_active()?,
                )
                .await;
            match outcome {
                Ok(outcome) => {
                    self.tasks.complete(task.id, true, &outcome.answer, now)?;
                }
                Err(err) => {
                    warn!("scheduled task failed (task_id={}, error={})", task.id, err);
                    self.tasks.complete(task.id, false, &err.to_string(), now)?;
                }
            }
            // the rollout stays for auditing; only the buffer is dropped
            self.memory.forget_session(session.id);
        }
        Ok(fired)
    }

    /// Spawn the background tick loop. Returns `None` when the scheduler
    /// is disabled in config.
    pub fn spawn_scheduler(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if !self.scheduler_enabled {
            info!("scheduler disabled by config");
            return None;
        }
        let orchestrator = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(orchestrator.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match orchestrator.tick(Utc::now()).await {
                    Ok(0) => {}
                    Ok(fired) => info!("scheduler tick fired tasks (count={})", fired),
                    Err(err) => warn!("scheduler tick failed (error={})", err),
                }
            }
        }))
    }
}
