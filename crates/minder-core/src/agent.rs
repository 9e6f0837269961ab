//! The THINK / PLAN / EXECUTE / OBSERVE turn loop.

use crate::error::CoreError;
use crate::prompt::{PromptInputs, build_request};
use crate::sessions::SessionStore;
use crate::types::Session;
use chrono::Utc;
use log::{debug, info, warn};
use minder_memory::MemoryManager;
use minder_protocol::{EventMsg, EventPayload, EventSink, Message, Role, TurnId};
use minder_router::{ModelDecision, ModelRouter, RoutedCompletion, ToolCallRequest, ToolSchema};
use minder_tools::{CallOrigin, DispatchContext, ToolDispatcher, new_tool_call_id};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Answer synthesized when the iteration cap is reached. The turn still
/// ends normally; the cap is a bound, not a failure.
const CAP_REACHED_ANSWER: &str = "I've reached the maximum number of steps for this request. \
     Here's what I accomplished so far, but the task may be incomplete.";

/// Phases of one turn. Every transition is driven either by a model
/// decision or by tool observations; there is no other control flow.
enum LoopState {
    /// Gather context and call the model.
    Think,
    /// Classify the model's decision.
    Plan(RoutedCompletion),
    /// Run the requested tool calls through the dispatcher.
    Execute(Vec<ToolCallRequest>),
    /// Feed the observations back into the conversation.
    Observe(Vec<Message>),
    /// Emit the final answer and stop.
    Done(String),
}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub turn_id: TurnId,
    /// The assistant's final answer (synthesized if the cap was hit).
    pub answer: String,
    /// Model calls made during the turn.
    pub iterations: usize,
}

/// Runs turns for sessions. Stateless between turns; all conversation
/// state lives in the memory manager and session store.
pub struct TurnExecutor {
    router: Arc<ModelRouter>,
    memory: Arc<MemoryManager>,
    dispatcher: Arc<ToolDispatcher>,
    sessions: SessionStore,
    default_model: String,
    temperature: f32,
    max_tokens: u32,
    max_iterations: usize,
    recall_k: usize,
}

impl TurnExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<ModelRouter>,
        memory: Arc<MemoryManager>,
        dispatcher: Arc<ToolDispatcher>,
        sessions: SessionStore,
        default_model: String,
        temperature: f32,
        max_tokens: u32,
        max_iterations: usize,
        recall_k: usize,
    ) -> Self {
        Self {
            router,
            memory,
            dispatcher,
            sessions,
            default_model,
            temperature,
            max_tokens,
            max_iterations: max_iterations.max(1),
            recall_k,
        }
    }

    /// Run one turn for a user message: append it to the conversation,
    /// then cycle through the loop until a final answer or the cap.
    ///
    /// Tool failures never end the turn; they become observations. Only a
    /// provider failure (after retries) surfaces as an error, and even
    /// then the session stays usable.
    pub async fn run_turn(
        &self,
        session: &Session,
        origin: CallOrigin,
        sink: Arc<dyn EventSink>,
        content: &str,
        active_tasks: usize,
    ) -> Result<TurnOutcome, CoreError> {
        let turn_id = Uuid::new_v4();
        sink.emit(EventMsg::new(session.id, EventPayload::Typing { turn_id }));
        info!(
            "turn started (session_id={}, turn_id={}, origin={:?})",
            session.id, turn_id, origin
        );

        let user_message = Message::new(Role::User, content);
        self.record(session, turn_id, &user_message, &sink)?;

        let ctx = DispatchContext {
            session_id: session.id,
            turn_id,
            origin,
            sink: sink.clone(),
        };

        let mut iterations = 0usize;
        let mut state = LoopState::Think;
        loop {
            state = match state {
                LoopState::Think => {
                    if iterations == self.max_iterations {
                        warn!(
                            "iteration cap reached (session_id={}, turn_id={}, cap={})",
                            session.id, turn_id, self.max_iterations
                        );
                        LoopState::Done(CAP_REACHED_ANSWER.to_string())
                    } else {
                        iterations += 1;
                        sink.emit(EventMsg::new(
                            session.id,
                            EventPayload::Status {
                                turn_id,
                                text: "thinking".to_string(),
                            },
                        ));
                        match self.think(session, content, active_tasks).await {
                            Ok(completion) => LoopState::Plan(completion),
                            Err(err) => {
                                return Err(self.turn_error(session, turn_id, &sink, err));
                            }
                        }
                    }
                }
                LoopState::Plan(completion) => {
                    sink.emit(EventMsg::new(
                        session.id,
                        EventPayload::Usage {
                            turn_id,
                            input_tokens: completion.usage.input_tokens,
                            output_tokens: completion.usage.output_tokens,
                            model: completion.model.clone(),
                        },
                    ));
                    if let Err(err) = self.sessions.append_usage(
                        session.id,
                        &completion.model,
                        completion.usage.input_tokens,
                        completion.usage.output_tokens,
                    ) {
                        return Err(self.turn_error(session, turn_id, &sink, err));
                    }
                    match completion.decision {
                        ModelDecision::FinalAnswer(answer) => LoopState::Done(answer),
                        ModelDecision::ToolCalls(calls) => LoopState::Execute(calls),
                    }
                }
                LoopState::Execute(calls) => {
                    let mut observations = Vec::with_capacity(calls.len());
                    for call in calls {
                        observations.push(self.execute(&ctx, &call).await);
                    }
                    LoopState::Observe(observations)
                }
                LoopState::Observe(observations) => {
                    for observation in observations {
                        self.record(session, turn_id, &observation, &sink)?;
                    }
                    LoopState::Think
                }
                LoopState::Done(answer) => {
                    let reply = Message::new(Role::Assistant, answer.clone());
                    self.record(session, turn_id, &reply, &sink)?;
                    sink.emit(EventMsg::new(session.id, EventPayload::Done { turn_id }));
                    info!(
                        "turn finished (session_id={}, turn_id={}, iterations={})",
                        session.id, turn_id, iterations
                    );
                    return Ok(TurnOutcome {
                        turn_id,
                        answer,
                        iterations,
                    });
                }
            };
        }
    }

    /// One model call: retrieve context, assemble the request, route it.
    async fn think(
        &self,
        session: &Session,
        query: &str,
        active_tasks: usize,
    ) -> Result<RoutedCompletion, CoreError> {
        let context = self
            .memory
            .retrieve(session.id, &session.user_id, query, self.recall_k)?;
        let inputs = PromptInputs {
            now: Utc::now(),
            active_tasks,
            session_message_count: context.short_term.len(),
            context: &context,
        };
        let tools: Vec<ToolSchema> = self
            .dispatcher
            .registry()
            .list(true)
            .into_iter()
            .map(|descriptor| ToolSchema {
                name: descriptor.name,
                description: descriptor.description,
                parameters: descriptor.parameter_schema,
            })
            .collect();
        let model = session
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let request = build_request(&inputs, model, tools, self.temperature, self.max_tokens);
        Ok(self
            .router
            .send(session.provider.as_deref(), request)
            .await?)
    }

    /// Dispatch one tool call and turn its result into an observation.
    async fn execute(&self, ctx: &DispatchContext, call: &ToolCallRequest) -> Message {
        ctx.sink.emit(EventMsg::new(
            ctx.session_id,
            EventPayload::Status {
                turn_id: ctx.turn_id,
                text: format!("running {}", call.name),
            },
        ));
        let tool_call_id = new_tool_call_id();
        let (content, result, success) = match self
            .dispatcher
            .invoke(ctx, &call.name, call.arguments.clone())
            .await
        {
            Ok(output) => {
                let content = format!("tool '{}' returned: {output}", call.name);
                (content, json!({ "output": output }), true)
            }
            Err(err) => {
                debug!(
                    "tool call observed as failure (tool={}, kind={})",
                    call.name,
                    err.kind()
                );
                let content = format!("tool '{}' failed ({}): {err}", call.name, err.kind());
                (
                    content,
                    json!({ "error": { "kind": err.kind(), "message": err.to_string() } }),
                    false,
                )
            }
        };
        ctx.sink.emit(EventMsg::new(
            ctx.session_id,
            EventPayload::ToolResult {
                turn_id: ctx.turn_id,
                tool_call_id,
                tool_name: call.name.clone(),
                result,
                success,
            },
        ));
        Message::new(Role::Tool, content)
    }

    /// Append a message everywhere it belongs: the short-term buffer (with
    /// eviction summarization), persistence, and the event stream.
    ///
    /// A storage failure ends the turn like a provider failure does: the
    /// error reaches subscribers as an event before it surfaces.
    fn record(
        &self,
        session: &Session,
        turn_id: TurnId,
        message: &Message,
        sink: &Arc<dyn EventSink>,
    ) -> Result<(), CoreError> {
        let stored = self
            .memory
            .append(session.id, message.clone())
            .map_err(CoreError::from)
            .and_then(|_| self.sessions.append_message(session.id, message));
        if let Err(err) = stored {
            return Err(self.turn_error(session, turn_id, sink, err));
        }
        sink.emit(EventMsg::new(
            session.id,
            EventPayload::Message {
                role: message.role,
                content: message.content.clone(),
            },
        ));
        Ok(())
    }

    /// Emit the turn's error event and hand the error back to the caller.
    fn turn_error(
        &self,
        session: &Session,
        turn_id: TurnId,
        sink: &Arc<dyn EventSink>,
        err: CoreError,
    ) -> CoreError {
        warn!(
            "turn failed (session_id={}, turn_id={}, error={})",
            session.id, turn_id, err
        );
        sink.emit(EventMsg::new(
            session.id,
            EventPayload::Error {
                turn_id: Some(turn_id),
                content: err.to_string(),
            },
        ));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minder_config::{SafetyConfig, SchedulerConfig};
    use minder_test_utils::{CollectingSink, EchoTool, ScriptedProvider, final_answer, tool_call};
    use minder_tools::ToolRegistry;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Fixture {
        executor: TurnExecutor,
        sessions: SessionStore,
        sink: CollectingSink,
        _dir: tempfile::TempDir,
    }

    fn build_executor(
        dir: &std::path::Path,
        sessions: SessionStore,
        script: Vec<Result<minder_router::Completion, minder_router::ProviderError>>,
    ) -> TurnExecutor {
        let router = ModelRouter::new("scripted", 1);
        router.register(Arc::new(ScriptedProvider::new("scripted", script)));

        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let dispatcher = ToolDispatcher::new(
            registry,
            &SafetyConfig::default(),
            &SchedulerConfig::default(),
            Duration::from_secs(5),
        )
        .expect("dispatcher");

        let memory = MemoryManager::new(dir.join("memory"), 50, 2000).expect("memory");
        TurnExecutor::new(
            Arc::new(router),
            Arc::new(memory),
            Arc::new(dispatcher),
            sessions,
            "scripted-model".to_string(),
            0.0,
            256,
            3,
            3,
        )
    }

    fn fixture(script: Vec<Result<minder_router::Completion, minder_router::ProviderError>>) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let sessions = SessionStore::new(None);
        let executor = build_executor(dir.path(), sessions.clone(), script);
        Fixture {
            executor,
            sessions,
            sink: CollectingSink::new(),
            _dir: dir,
        }
    }

    async fn run(fixture: &Fixture, content: &str) -> Result<TurnOutcome, CoreError> {
        let session = fixture.sessions.create("default").expect("session");
        fixture
            .executor
            .run_turn(
                &session,
                CallOrigin::Interactive,
                Arc::new(fixture.sink.clone()),
                content,
                0,
            )
            .await
    }

    #[tokio::test]
    async fn direct_answer_finishes_in_one_iteration() {
        let fixture = fixture(vec![final_answer("hello there")]);
        let outcome = run(&fixture, "hi").await.expect("turn");
        assert_eq!(outcome.answer, "hello there");
        assert_eq!(outcome.iterations, 1);
        assert!(
            fixture
                .sink
                .payloads()
                .iter()
                .any(|p| matches!(p, EventPayload::Done { .. }))
        );
    }

    #[tokio::test]
    async fn tool_call_result_is_observed_then_answered() {
        let fixture = fixture(vec![
            tool_call("echo", json!({ "text": "ping" })),
            final_answer("the echo said ping"),
        ]);
        let outcome = run(&fixture, "echo ping").await.expect("turn");
        assert_eq!(outcome.answer, "the echo said ping");
        assert_eq!(outcome.iterations, 2);

        let tool_results: Vec<bool> = fixture
            .sink
            .payloads()
            .iter()
            .filter_map(|p| match p {
                EventPayload::ToolResult { success, .. } => Some(*success),
                _ => None,
            })
            .collect();
        assert_eq!(tool_results, vec![true]);

        let observed = fixture.sink.payloads().iter().any(|p| {
            matches!(p, EventPayload::Message { role: Role::Tool, content }
                if content.contains("ping"))
        });
        assert!(observed, "tool output should enter the conversation");
    }

    #[tokio::test]
    async fn unknown_tool_is_observed_not_fatal() {
        let fixture = fixture(vec![
            tool_call("imaginary", json!({})),
            final_answer("that tool does not exist, sorry"),
        ]);
        let outcome = run(&fixture, "use the imaginary tool").await.expect("turn");
        assert_eq!(outcome.answer, "that tool does not exist, sorry");

        let failures: Vec<bool> = fixture
            .sink
            .payloads()
            .iter()
            .filter_map(|p| match p {
                EventPayload::ToolResult { success, .. } => Some(*success),
                _ => None,
            })
            .collect();
        assert_eq!(failures, vec![false]);
        assert!(
            !fixture
                .sink
                .payloads()
                .iter()
                .any(|p| matches!(p, EventPayload::Error { .. })),
            "tool failures are observations, not errors"
        );
    }

    #[tokio::test]
    async fn iteration_cap_synthesizes_an_answer() {
        // more tool calls than the cap of 3 allows
        let fixture = fixture(vec![
            tool_call("echo", json!({ "text": "one" })),
            tool_call("echo", json!({ "text": "two" })),
            tool_call("echo", json!({ "text": "three" })),
            tool_call("echo", json!({ "text": "four" })),
        ]);
        let outcome = run(&fixture, "loop forever").await.expect("turn");
        assert_eq!(outcome.iterations, 3);
        assert!(outcome.answer.contains("maximum number of steps"));
        assert!(
            fixture
                .sink
                .payloads()
                .iter()
                .any(|p| matches!(p, EventPayload::Done { .. }))
        );
    }

    #[tokio::test]
    async fn storage_failure_mid_turn_emits_error_and_surfaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rollouts = dir.path().join("sessions");
        let state = crate::state::JsonlStateStore::new(&rollouts).expect("state store");
        let sessions = SessionStore::new(Some(Arc::new(state)));
        let executor = build_executor(dir.path(), sessions.clone(), vec![final_answer("hi")]);
        let sink = CollectingSink::new();

        let session = sessions.create("default").expect("session");
        // take the rollout directory out from under the store
        std::fs::remove_dir_all(&rollouts).expect("remove rollouts");

        let err = executor
            .run_turn(
                &session,
                CallOrigin::Interactive,
                Arc::new(sink.clone()),
                "hello",
                0,
            )
            .await
            .expect_err("append should fail");
        assert!(matches!(err, CoreError::State(_)));
        assert!(
            sink.payloads()
                .iter()
                .any(|p| matches!(p, EventPayload::Error { turn_id: Some(_), .. })),
            "storage failures must reach subscribers as error events"
        );
    }

    #[tokio::test]
    async fn usage_is_persisted_per_model_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = crate::state::JsonlStateStore::new(dir.path().join("sessions"))
            .expect("state store");
        let state: Arc<crate::state::JsonlStateStore> = Arc::new(state);
        let sessions = SessionStore::new(Some(state.clone()));
        let executor = build_executor(
            dir.path(),
            sessions.clone(),
            vec![
                tool_call("echo", json!({ "text": "ping" })),
                final_answer("done"),
            ],
        );

        let session = sessions.create("default").expect("session");
        executor
            .run_turn(
                &session,
                CallOrigin::Interactive,
                Arc::new(CollectingSink::new()),
                "echo ping",
                0,
            )
            .await
            .expect("turn");

        // the scripted provider reports 10 in / 5 out per call
        use crate::state::StateStore;
        let record = state
            .load_session(session.id)
            .expect("load")
            .expect("record");
        assert_eq!(record.input_tokens, 20);
        assert_eq!(record.output_tokens, 10);
    }

    #[tokio::test]
    async fn provider_failure_emits_error_and_surfaces() {
        let fixture = fixture(vec![Err(minder_router::ProviderError::Auth(
            "bad key".to_string(),
        ))]);
        let err = run(&fixture, "hi").await.expect_err("provider error");
        assert!(matches!(err, CoreError::Provider(_)));
        assert!(
            fixture
                .sink
                .payloads()
                .iter()
                .any(|p| matches!(p, EventPayload::Error { turn_id: Some(_), .. }))
        );
    }
}
