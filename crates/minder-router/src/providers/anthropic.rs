//! Anthropic messages API client.

use super::{ChatProvider, REQUEST_TIMEOUT, status_error, transport_error};
use crate::error::ProviderError;
use crate::types::{ChatRequest, Completion, TokenUsage, ToolCallRequest};
use async_trait::async_trait;
use log::debug;
use minder_protocol::Role;
use serde::Deserialize;
use serde_json::{Value, json};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic messages wire format.
pub struct AnthropicProvider {
    id: String,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AnthropicProvider {
    pub fn new(id: impl Into<String>, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            id: id.into(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
        }
    }

    /// The messages API takes the system prompt out-of-band and only
    /// accepts alternating user/assistant turns; tool observations are
    /// folded into user turns.
    fn body(&self, request: &ChatRequest) -> Value {
        let mut system = String::new();
        let mut messages: Vec<Value> = Vec::new();
        for m in &request.messages {
            match m.role {
                Role::System => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(&m.content);
                }
                Role::Assistant => {
                    messages.push(json!({ "role": "assistant", "content": m.content }));
                }
                Role::User => {
                    messages.push(json!({ "role": "user", "content": m.content }));
                }
                Role::Tool => {
                    let content = format!("[tool result]\n{}", m.content);
                    messages.push(json!({ "role": "user", "content": content }));
                }
            }
        }

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = Value::String(system);
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<UsageBlock>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(
            "sending messages request (provider={}, model={})",
            self.id, request.model
        );
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Auth("missing anthropic api key".to_string()))?;
        let response = self
            .client
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&self.body(request))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCallRequest {
                    id: Some(id),
                    name,
                    arguments: input,
                }),
                ContentBlock::Other => {}
            }
        }

        let usage = match parsed.usage {
            Some(u) => TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            },
            None => TokenUsage::estimate(super::request_chars(request), text.len()),
        };

        Ok(Completion {
            text,
            tool_calls,
            usage,
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
        })
    }
}
