//! Concrete provider clients normalizing divergent wire formats.

mod anthropic;
mod gemini;
mod ollama;
mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::error::ProviderError;
use crate::types::{ChatRequest, Completion};
use async_trait::async_trait;
use std::time::Duration;

/// Default HTTP timeout for provider calls.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One model provider the router can send a request to.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Registry id for this provider instance.
    fn id(&self) -> &str;

    /// Send a bounded context and normalize the response.
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError>;
}

/// Map an HTTP status plus body excerpt onto the provider error taxonomy.
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let detail = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        ProviderError::Auth(detail)
    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited(detail)
    } else {
        ProviderError::Network(detail)
    }
}

/// Map a reqwest transport failure onto the taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Network(err.to_string())
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

/// Character count of a request's messages, for usage estimation.
pub(crate) fn request_chars(request: &ChatRequest) -> usize {
    request.messages.iter().map(|m| m.content.len()).sum()
}
