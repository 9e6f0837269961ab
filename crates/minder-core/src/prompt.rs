//! Context assembly for model calls.

use chrono::{DateTime, Utc};
use minder_memory::RetrievedContext;
use minder_protocol::Role;
use minder_router::{ChatMessage, ChatRequest, ToolSchema};

/// Everything the system preamble is built from.
pub struct PromptInputs<'a> {
    pub now: DateTime<Utc>,
    pub active_tasks: usize,
    pub session_message_count: usize,
    pub context: &'a RetrievedContext,
}

/// Build the system preamble: time, task and message counts, retrieved
/// memories, then profile facts. Profile facts are never omitted.
pub fn build_system_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut prompt = String::from(
        "You are Minder, a personal assistant running on the user's own machine. \
         Use the available tools when a request needs action; answer directly when it does not. \
         When you have completed the request, reply with the final answer instead of another tool call.\n",
    );
    prompt.push_str(&format!(
        "Current time: {}\n",
        inputs.now.format("%Y-%m-%d %H:%M UTC")
    ));
    prompt.push_str(&format!("Active tasks: {}\n", inputs.active_tasks));
    prompt.push_str(&format!(
        "Messages this session: {}\n",
        inputs.session_message_count
    ));

    if !inputs.context.records.is_empty() {
        prompt.push_str("Relevant memories from earlier conversations:\n");
        for record in &inputs.context.records {
            prompt.push_str(&format!("- {}\n", record.summary_text.replace('\n', " ")));
        }
    }

    if !inputs.context.profile.is_empty() {
        prompt.push_str("What you know about the user:\n");
        for (key, value) in &inputs.context.profile {
            prompt.push_str(&format!("- {key}: {value}\n"));
        }
    }

    prompt
}

/// Assemble the full request: preamble, then the live short-term buffer
/// in conversation order.
pub fn build_request(
    inputs: &PromptInputs<'_>,
    model: String,
    tools: Vec<ToolSchema>,
    temperature: f32,
    max_tokens: u32,
) -> ChatRequest {
    let mut messages = Vec::with_capacity(inputs.context.short_term.len() + 1);
    messages.push(ChatMessage::new(Role::System, build_system_prompt(inputs)));
    for message in &inputs.context.short_term {
        messages.push(ChatMessage::new(message.role, message.content.clone()));
    }
    ChatRequest {
        model,
        messages,
        tools,
        temperature,
        max_tokens,
    }
}
