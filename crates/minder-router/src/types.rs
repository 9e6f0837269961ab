//! Request/response types shared by all providers.

use minder_protocol::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in the ordered context sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Declared schema for a tool, advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON-schema object describing the tool's parameters.
    pub parameters: Value,
}

/// Bounded, ordered context plus generation settings for one call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Input/output token counts for one provider call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Rough estimate when a provider omits usage numbers: 4 chars/token.
    pub fn estimate(input_chars: usize, output_chars: usize) -> Self {
        Self {
            input_tokens: input_chars.div_ceil(4) as u64,
            output_tokens: output_chars.div_ceil(4) as u64,
        }
    }
}

/// A tool invocation the model asked for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    /// Provider-assigned call id, when present.
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

/// Normalized provider output before classification.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: TokenUsage,
    pub model: String,
}

impl Completion {
    /// Classify the completion into the decision that drives the loop.
    ///
    /// Tool calls win over free text: a model that emits both intends the
    /// text as commentary, not as the final answer.
    pub fn into_decision(self) -> ModelDecision {
        if self.tool_calls.is_empty() {
            ModelDecision::FinalAnswer(self.text)
        } else {
            ModelDecision::ToolCalls(self.tool_calls)
        }
    }
}

/// Parsed output of one router call. Transient, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDecision {
    /// The model produced a user-facing answer; the turn is over.
    FinalAnswer(String),
    /// The model asked for one or more tool invocations.
    ToolCalls(Vec<ToolCallRequest>),
}

/// Decision plus per-call accounting, returned by the router.
#[derive(Debug, Clone)]
pub struct RoutedCompletion {
    pub decision: ModelDecision,
    pub usage: TokenUsage,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn completion_without_tool_calls_is_final_answer() {
        let completion = Completion {
            text: "hello".to_string(),
            tool_calls: Vec::new(),
            usage: TokenUsage::default(),
            model: "m".to_string(),
        };
        assert_eq!(
            completion.into_decision(),
            ModelDecision::FinalAnswer("hello".to_string())
        );
    }

    #[test]
    fn tool_calls_take_precedence_over_text() {
        let call = ToolCallRequest {
            id: Some("call_1".to_string()),
            name: "browser".to_string(),
            arguments: json!({ "url": "https://example.com" }),
        };
        let completion = Completion {
            text: "let me check".to_string(),
            tool_calls: vec![call.clone()],
            usage: TokenUsage::default(),
            model: "m".to_string(),
        };
        assert_eq!(completion.into_decision(), ModelDecision::ToolCalls(vec![call]));
    }

    #[test]
    fn token_estimate_rounds_up() {
        let usage = TokenUsage::estimate(9, 0);
        assert_eq!(usage.input_tokens, 3);
        assert_eq!(usage.output_tokens, 0);
    }
}
