//! Google Gemini generateContent API client.

use super::{ChatProvider, REQUEST_TIMEOUT, status_error, transport_error};
use crate::error::ProviderError;
use crate::types::{ChatRequest, Completion, TokenUsage, ToolCallRequest};
use async_trait::async_trait;
use log::debug;
use minder_protocol::Role;
use serde::Deserialize;
use serde_json::{Value, json};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Client for the Gemini generateContent wire format.
pub struct GeminiProvider {
    id: String,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiProvider {
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

    /// Gemini takes the system prompt as a separate `systemInstruction`,
    /// calls the assistant role "model", and carries tool observations as
    /// `functionResponse` parts under role "function"; consecutive tool
    /// observations share one function block.
    fn body(&self, request: &ChatRequest) -> Value {
        let mut system = String::new();
        let mut contents: Vec<Value> = Vec::new();
        for m in &request.messages {
            match m.role {
                Role::System => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(&m.content);
                }
                Role::User => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{ "text": m.content }],
                    }));
                }
                Role::Assistant => {
                    contents.push(json!({
                        "role": "model",
                        "parts": [{ "text": m.content }],
                    }));
                }
                Role::Tool => {
                    let part = json!({
                        "functionResponse": {
                            "name": "tool",
                            "response": { "result": m.content },
                        }
                    });
                    match contents.last_mut() {
                        Some(last) if last["role"] == "function" => {
                            if let Some(parts) = last["parts"].as_array_mut() {
                                parts.push(part);
                            }
                        }
                        _ => contents.push(json!({ "role": "function", "parts": [part] })),
                    }
                }
            }
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
                "temperature": request.temperature,
            },
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "functionCall")]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Auth("missing gemini api key".to_string()))?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, request.model, key
        );
        debug!(
            "sending generateContent request (provider={}, model={})",
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

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let parts = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts)
            .unwrap_or_default();
        for part in parts {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(call) = part.function_call {
                tool_calls.push(ToolCallRequest {
                    id: None,
                    name: call.name,
                    arguments: call.args,
                });
            }
        }

        let usage = match parsed.usage_metadata {
            Some(u) => TokenUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            },
            None => TokenUsage::estimate(super::request_chars(request), text.len()),
        };

        Ok(Completion {
            text,
            tool_calls,
            usage,
            // generateContent does not echo the model back
            model: request.model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::GeminiProvider;
    use crate::types::{ChatMessage, ChatRequest, ToolSchema};
    use minder_protocol::Role;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn provider() -> GeminiProvider {
        GeminiProvider::new("gemini", None, Some("k".to_string()))
    }

    #[test]
    fn body_maps_roles_and_folds_consecutive_tool_results() {
        let request = ChatRequest {
            model: "gemini-1.5-flash".to_string(),
            messages: vec![
                ChatMessage::new(Role::System, "be brief"),
                ChatMessage::new(Role::User, "check two things"),
                ChatMessage::new(Role::Assistant, "on it"),
                ChatMessage::new(Role::Tool, "first result"),
                ChatMessage::new(Role::Tool, "second result"),
            ],
            tools: Vec::new(),
            temperature: 0.2,
            max_tokens: 64,
        };
        let body = provider().body(&request);

        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            json!("be brief")
        );
        let contents = body["contents"].as_array().expect("contents");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], json!("user"));
        assert_eq!(contents[1]["role"], json!("model"));
        assert_eq!(contents[2]["role"], json!("function"));
        let parts = contents[2]["parts"].as_array().expect("parts");
        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[1]["functionResponse"]["response"]["result"],
            json!("second result")
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], json!(64));
    }

    #[test]
    fn body_declares_tools_under_one_function_block() {
        let request = ChatRequest {
            model: "gemini-1.5-flash".to_string(),
            messages: vec![ChatMessage::new(Role::User, "hi")],
            tools: vec![ToolSchema {
                name: "echo".to_string(),
                description: "Echo text".to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            }],
            temperature: 0.0,
            max_tokens: 32,
        };
        let body = provider().body(&request);
        let declarations = body["tools"][0]["functionDeclarations"]
            .as_array()
            .expect("declarations");
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0]["name"], json!("echo"));
    }
}
