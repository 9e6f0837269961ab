//! Ollama local API client.

use super::{ChatProvider, REQUEST_TIMEOUT, request_chars, status_error, transport_error};
use crate::error::ProviderError;
use crate::types::{ChatRequest, Completion, TokenUsage, ToolCallRequest};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client for a locally running Ollama server. No credentials involved.
pub struct OllamaProvider {
    id: String,
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(id: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            id: id.into(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
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
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
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
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<RawToolCall>,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    function: RawFunction,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    /// Already a JSON object, unlike the OpenAI wire format.
    arguments: Value,
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(
            "sending ollama chat (provider={}, model={})",
            self.id, request.model
        );
        let response = self
            .client
            .post(&url)
            .json(&self.body(request))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let parsed: OllamaResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let tool_calls: Vec<ToolCallRequest> = parsed
            .message
            .tool_calls
            .into_iter()
            .map(|raw| ToolCallRequest {
                id: None,
                name: raw.function.name,
                arguments: raw.function.arguments,
            })
            .collect();

        let text = parsed.message.content;
        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (Some(input), Some(output)) => TokenUsage {
                input_tokens: input,
                output_tokens: output,
            },
            _ => TokenUsage::estimate(request_chars(request), text.len()),
        };

        Ok(Completion {
            text,
            tool_calls,
            usage,
            model: request.model.clone(),
        })
    }
}
