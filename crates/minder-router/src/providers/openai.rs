//! OpenAI-compatible chat completions client.
//!
//! Also serves OpenRouter and other compatible gateways through a custom
//! `base_url`.

use super::{ChatProvider, REQUEST_TIMEOUT, request_chars, status_error, transport_error};
use crate::error::ProviderError;
use crate::types::{ChatRequest, Completion, TokenUsage, ToolCallRequest};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for the OpenAI chat completions wire format.
pub struct OpenAiProvider {
    id: String,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
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

    fn body(&self, request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageBlock>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<RawToolCall>,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    #[serde(default)]
    id: Option<String>,
    function: RawFunction,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    /// JSON-encoded argument object.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            "sending chat completion (provider={}, model={}, messages={})",
            self.id,
            request.model,
            request.messages.len()
        );
        let mut http = self.client.post(&url).json(&self.body(request));
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }
        let response = http.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("no choices in response".to_string()))?;

        let mut tool_calls = Vec::with_capacity(choice.message.tool_calls.len());
        for raw in choice.message.tool_calls {
            let arguments: Value = serde_json::from_str(&raw.function.arguments).map_err(|e| {
                ProviderError::MalformedResponse(format!(
                    "tool call arguments for {}: {e}",
                    raw.function.name
                ))
            })?;
            tool_calls.push(ToolCallRequest {
                id: raw.id,
                name: raw.function.name,
                arguments,
            });
        }

        let text = choice.message.content.unwrap_or_default();
        let usage = match parsed.usage {
            Some(u) => TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            },
            None => TokenUsage::estimate(request_chars(request), text.len()),
        };

        Ok(Completion {
            text,
            tool_calls,
            usage,
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
        })
    }
}
