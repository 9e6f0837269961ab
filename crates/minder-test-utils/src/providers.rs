//! Scripted model providers for deterministic loop tests.

use async_trait::async_trait;
use minder_router::{
    ChatProvider, ChatRequest, Completion, ProviderError, TokenUsage, ToolCallRequest,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;

/// Provider that replays a fixed script of completions and failures.
pub struct ScriptedProvider {
    id: String,
    script: Mutex<VecDeque<Result<Completion, ProviderError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(id: &str, script: Vec<Result<Completion, ProviderError>>) -> Self {
        Self {
            id: id.to_string(),
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of completed calls so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().push(request.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".to_string())))
    }
}

/// A completion carrying only a final answer.
pub fn final_answer(text: &str) -> Result<Completion, ProviderError> {
    Ok(Completion {
        text: text.to_string(),
        tool_calls: Vec::new(),
        usage: TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        },
        model: "scripted".to_string(),
    })
}

/// A completion asking for one tool call.
pub fn tool_call(name: &str, arguments: Value) -> Result<Completion, ProviderError> {
    Ok(Completion {
        text: String::new(),
        tool_calls: vec![ToolCallRequest {
            id: Some(format!("call_{name}")),
            name: name.to_string(),
            arguments,
        }],
        usage: TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        },
        model: "scripted".to_string(),
    })
}
