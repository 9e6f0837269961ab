//! End-to-end dispatch pipeline tests.

use async_trait::async_trait;
use minder_config::{SafetyConfig, SchedulerConfig};
use minder_protocol::{
    ApprovalDecision, EventMsg, EventPayload, EventSink, NullEventSink, ToolError,
};
use minder_tools::{CallOrigin, DispatchContext, Tool, ToolDispatcher, ToolRegistry};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug)]
struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a shell command"
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "command": { "type": "string" } },
            "required": ["command"],
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        Ok(format!("ran: {}", args["command"].as_str().unwrap_or_default()))
    }
}

#[derive(Debug)]
struct BrowserTool {
    hold: Duration,
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        "browser"
    }

    fn description(&self) -> &str {
        "Navigate the shared browser"
    }

    fn parameter_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn resource(&self) -> Option<String> {
        Some("browser".to_string())
    }

    async fn execute(&self, _args: Value) -> Result<String, ToolError> {
        tokio::time::sleep(self.hold).await;
        Ok("navigated".to_string())
    }
}

#[derive(Default, Clone)]
struct RecordingSink {
    events: Arc<Mutex<Vec<EventMsg>>>,
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EventMsg) {
        self.events.lock().push(event);
    }
}

fn dispatcher(safety: SafetyConfig, scheduler: SchedulerConfig) -> ToolDispatcher {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(ShellTool));
    registry.register(Arc::new(BrowserTool {
        hold: Duration::from_millis(20),
    }));
    ToolDispatcher::new(registry, &safety, &scheduler, Duration::from_secs(5))
        .expect("build dispatcher")
}

fn interactive_ctx(sink: Arc<dyn EventSink>) -> DispatchContext {
    DispatchContext {
        session_id: Uuid::new_v4(),
        turn_id: Uuid::new_v4(),
        origin: CallOrigin::Interactive,
        sink,
    }
}

#[tokio::test]
async fn unknown_tool_is_rejected_first() {
    let dispatcher = dispatcher(SafetyConfig::default(), SchedulerConfig::default());
    let ctx = interactive_ctx(Arc::new(NullEventSink));
    let err = dispatcher
        .invoke(&ctx, "teleport", json!({}))
        .await
        .expect_err("unknown");
    assert_eq!(err.kind(), "unknown_tool");
}

#[tokio::test]
async fn disabled_tool_is_rejected() {
    let dispatcher = dispatcher(SafetyConfig::default(), SchedulerConfig::default());
    dispatcher.registry().set_enabled("browser", false);
    let ctx = interactive_ctx(Arc::new(NullEventSink));
    let err = dispatcher
        .invoke(&ctx, "browser", json!({}))
        .await
        .expect_err("disabled");
    assert_eq!(err.kind(), "disabled");
}

#[tokio::test]
async fn invalid_arguments_fail_before_confirmation() {
    // confirmation would hang without a resolver; validation must reject
    // the call before gating is even considered
    let dispatcher = dispatcher(SafetyConfig::default(), SchedulerConfig::default());
    let ctx = interactive_ctx(Arc::new(NullEventSink));
    let err = dispatcher
        .invoke(&ctx, "shell", json!({ "command": 7 }))
        .await
        .expect_err("invalid");
    assert_eq!(err.kind(), "validation_failed");
}

#[tokio::test]
async fn denylist_rejects_identically_with_and_without_confirmation() {
    let args = json!({ "command": "rm -rf / tmp" });

    let gated = dispatcher(SafetyConfig::default(), SchedulerConfig::default());
    let ctx = interactive_ctx(Arc::new(NullEventSink));
    let err_gated = gated
        .invoke(&ctx, "shell", args.clone())
        .await
        .expect_err("denied");

    let ungated = dispatcher(
        SafetyConfig {
            require_confirmation: false,
            ..SafetyConfig::default()
        },
        SchedulerConfig::default(),
    );
    let err_ungated = ungated
        .invoke(&ctx, "shell", args)
        .await
        .expect_err("denied");

    assert_eq!(err_gated.kind(), "denied");
    assert_eq!(err_gated.to_string(), err_ungated.to_string());
}

#[tokio::test(start_paused = true)]
async fn confirmation_timeout_resolves_to_denied() {
    let dispatcher = dispatcher(
        SafetyConfig {
            confirmation_timeout_secs: 1,
            ..SafetyConfig::default()
        },
        SchedulerConfig::default(),
    );
    let sink = RecordingSink::default();
    let ctx = interactive_ctx(Arc::new(sink.clone()));

    let err = dispatcher
        .invoke(&ctx, "shell", json!({ "command": "ls" }))
        .await
        .expect_err("timed out");
    assert_eq!(err.kind(), "denied");

    let events = sink.events.lock();
    assert!(matches!(
        events[0].payload,
        EventPayload::ConfirmationRequested { .. }
    ));
    assert!(matches!(
        events[1].payload,
        EventPayload::ConfirmationResolved {
            decision: ApprovalDecision::Deny,
            ..
        }
    ));
}

#[tokio::test]
async fn approved_confirmation_executes_the_tool() {
    let dispatcher = Arc::new(dispatcher(
        SafetyConfig::default(),
        SchedulerConfig::default(),
    ));
    let sink = RecordingSink::default();
    let ctx = interactive_ctx(Arc::new(sink.clone()));

    let invocation = {
        let dispatcher = dispatcher.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            dispatcher
                .invoke(&ctx, "shell", json!({ "command": "ls" }))
                .await
        })
    };

    // wait for the request event, then approve it
    let request_id = loop {
        let pending = sink
            .events
            .lock()
            .iter()
            .find_map(|e| match &e.payload {
                EventPayload::ConfirmationRequested { request_id, .. } => Some(*request_id),
                _ => None,
            });
        if let Some(id) = pending {
            break id;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    assert!(dispatcher.resolve_confirmation(request_id, ApprovalDecision::Approve));

    let result = invocation.await.expect("join").expect("approved call");
    assert_eq!(result, "ran: ls");
}

#[tokio::test]
async fn headless_confirmation_is_auto_denied_unless_allowlisted() {
    let dispatcher = dispatcher(SafetyConfig::default(), SchedulerConfig::default());
    let ctx = DispatchContext {
        origin: CallOrigin::Headless,
        ..interactive_ctx(Arc::new(NullEventSink))
    };
    let err = dispatcher
        .invoke(&ctx, "shell", json!({ "command": "ls" }))
        .await
        .expect_err("auto denied");
    assert_eq!(err.kind(), "denied");

    let allowing = dispatcher_with_allowlist(vec!["shell".to_string()]);
    let result = allowing
        .invoke(&ctx, "shell", json!({ "command": "ls" }))
        .await
        .expect("allowlisted");
    assert_eq!(result, "ran: ls");
}

fn dispatcher_with_allowlist(headless_allow: Vec<String>) -> ToolDispatcher {
    dispatcher(
        SafetyConfig::default(),
        SchedulerConfig {
            headless_allow,
            ..SchedulerConfig::default()
        },
    )
}

#[tokio::test]
async fn contending_calls_on_one_resource_serialize_and_both_complete() {
    let dispatcher = Arc::new(dispatcher(
        SafetyConfig::default(),
        SchedulerConfig::default(),
    ));

    // a live session and a headless task both want the browser
    let live = {
        let dispatcher = dispatcher.clone();
        let ctx = interactive_ctx(Arc::new(NullEventSink));
        tokio::spawn(async move { dispatcher.invoke(&ctx, "browser", json!({})).await })
    };
    let headless = {
        let dispatcher = dispatcher.clone();
        let ctx = DispatchContext {
            origin: CallOrigin::Headless,
            ..interactive_ctx(Arc::new(NullEventSink))
        };
        tokio::spawn(async move { dispatcher.invoke(&ctx, "browser", json!({})).await })
    };

    let first = live.await.expect("join").expect("live call");
    let second = headless.await.expect("join").expect("headless call");
    assert_eq!(first, "navigated");
    assert_eq!(second, "navigated");
}

#[tokio::test(start_paused = true)]
async fn slow_handler_times_out_as_execution_failed() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(BrowserTool {
        hold: Duration::from_secs(600),
    }));
    let dispatcher = ToolDispatcher::new(
        registry,
        &SafetyConfig::default(),
        &SchedulerConfig::default(),
        Duration::from_secs(1),
    )
    .expect("build dispatcher");
    let ctx = interactive_ctx(Arc::new(NullEventSink));

    let err = dispatcher
        .invoke(&ctx, "browser", json!({}))
        .await
        .expect_err("timeout");
    assert_eq!(err.kind(), "execution_failed");
}
