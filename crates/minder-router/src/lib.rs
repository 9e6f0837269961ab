//! Model router: one request/response shape over heterogeneous providers,
//! with retry/backoff and per-call token accounting.

mod error;
mod providers;
mod types;

pub use error::ProviderError;
pub use providers::{
    AnthropicProvider, ChatProvider, GeminiProvider, OllamaProvider, OpenAiProvider,
};
pub use types::{
    ChatMessage, ChatRequest, Completion, ModelDecision, RoutedCompletion, TokenUsage,
    ToolCallRequest, ToolSchema,
};

use log::{debug, info, warn};
use minder_config::ModelConfig;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Initial backoff delay; doubles per retry attempt.
const BACKOFF_BASE_MS: u64 = 500;
/// Upper bound on random jitter added to each backoff delay.
const BACKOFF_JITTER_MS: u64 = 250;

/// Routes requests to registered providers and normalizes their output
/// into a [`ModelDecision`].
pub struct ModelRouter {
    providers: Arc<RwLock<HashMap<String, Arc<dyn ChatProvider>>>>,
    default_provider: Arc<RwLock<String>>,
    max_retries: u32,
}

impl ModelRouter {
    pub fn new(default_id: impl Into<String>, max_retries: u32) -> Self {
        Self {
            providers: Arc::new(RwLock::new(HashMap::default())),
            default_provider: Arc::new(RwLock::new(default_id.into())),
            max_retries,
        }
    }

    /// Build a router with the single provider named in config registered
    /// as the default.
    pub fn from_model_config(config: &ModelConfig, max_retries: u32) -> Self {
        let provider: Arc<dyn ChatProvider> = match config.provider.as_str() {
            "anthropic" => Arc::new(AnthropicProvider::new(
                config.provider.clone(),
                config.base_url.clone(),
                config.api_key.clone(),
            )),
            "gemini" => Arc::new(GeminiProvider::new(
                config.provider.clone(),
                config.base_url.clone(),
                config.api_key.clone(),
            )),
            "ollama" => Arc::new(OllamaProvider::new(
                config.provider.clone(),
                config.base_url.clone(),
            )),
            // openai, openrouter, and any other compatible gateway
            _ => Arc::new(OpenAiProvider::new(
                config.provider.clone(),
                config.base_url.clone(),
                config.api_key.clone(),
            )),
        };
        let router = Self::new(config.provider.clone(), max_retries);
        router.register(provider);
        router
    }

    /// Register a provider under its id.
    pub fn register(&self, provider: Arc<dyn ChatProvider>) {
        let id = provider.id().to_string();
        debug!("registering provider (id={})", id);
        self.providers.write().insert(id, provider);
    }

    /// Return the current default provider id.
    pub fn default_provider_id(&self) -> String {
        self.default_provider.read().clone()
    }

    /// Set the default provider to an already-registered id.
    pub fn set_default_provider(&self, provider_id: impl Into<String>) -> Result<(), ProviderError> {
        let provider_id = provider_id.into();
        if !self.providers.read().contains_key(&provider_id) {
            return Err(ProviderError::UnknownProvider(provider_id));
        }
        *self.default_provider.write() = provider_id;
        Ok(())
    }

    /// Resolve a requested provider id, falling back to the default.
    pub fn resolve_provider_id(&self, provider_id: Option<&str>) -> Result<String, ProviderError> {
        let resolved = if let Some(provider_id) = provider_id {
            provider_id.to_string()
        } else {
            self.default_provider.read().clone()
        };
        if !self.providers.read().contains_key(&resolved) {
            return Err(ProviderError::UnknownProvider(resolved));
        }
        Ok(resolved)
    }

    /// Send a request through the named (or default) provider.
    ///
    /// Transient failures are retried with exponential backoff and jitter
    /// up to the attempt cap; everything else surfaces immediately.
    pub async fn send(
        &self,
        provider_id: Option<&str>,
        request: ChatRequest,
    ) -> Result<RoutedCompletion, ProviderError> {
        let resolved = self.resolve_provider_id(provider_id)?;
        let provider = self
            .providers
            .read()
            .get(&resolved)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(resolved.clone()))?;

        let mut attempt: u32 = 0;
        loop {
            match provider.complete(&request).await {
                Ok(completion) => {
                    info!(
                        "completion ok (provider={}, model={}, in={}, out={})",
                        resolved,
                        completion.model,
                        completion.usage.input_tokens,
                        completion.usage.output_tokens
                    );
                    let usage = completion.usage;
                    let model = completion.model.clone();
                    return Ok(RoutedCompletion {
                        decision: completion.into_decision(),
                        usage,
                        model,
                    });
                }
                Err(err) if err.is_transient() && attempt + 1 < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        "transient provider failure, retrying (provider={}, kind={}, attempt={}, delay_ms={})",
                        resolved,
                        err.kind(),
                        attempt + 1,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(
                        "provider failed (provider={}, kind={}, attempts={})",
                        resolved,
                        err.kind(),
                        attempt + 1
                    );
                    return Err(err);
                }
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(1 << attempt.min(8));
    let jitter = rand::rng().random_range(0..BACKOFF_JITTER_MS);
    Duration::from_millis(base + jitter)
}
