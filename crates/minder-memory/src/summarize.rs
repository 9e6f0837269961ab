//! Summarization of evicted short-term messages.

use minder_protocol::Message;

/// How much of each message contributes to a summary line.
const PER_MESSAGE_CHARS: usize = 300;
/// How much of a summary is fed to the embedder.
pub const EMBED_CHARS: usize = 1000;

/// Turns an evicted block of messages into one summary text.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, messages: &[Message], max_chars: usize) -> String;
}

/// Local extractive summarizer: one truncated line per message.
///
/// Keeps eviction cheap and deterministic; a model-backed implementation
/// can be substituted where higher-quality compression is worth a
/// router call.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveSummarizer;

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, messages: &[Message], max_chars: usize) -> String {
        let lines: Vec<String> = messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), truncate(&m.content, PER_MESSAGE_CHARS)))
            .collect();
        truncate(&lines.join("\n"), max_chars)
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
