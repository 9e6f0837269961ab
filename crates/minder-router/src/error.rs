use thiserror::Error;

/// Errors surfaced by providers and the router.
///
/// Transient kinds are retried with backoff up to the configured cap;
/// the rest surface immediately.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Missing or rejected credentials.
    #[error("provider auth failed: {0}")]
    Auth(String),
    /// The provider throttled the request.
    #[error("provider rate limited: {0}")]
    RateLimited(String),
    /// Connection, timeout, or server-side failure.
    #[error("provider network error: {0}")]
    Network(String),
    /// The provider responded with something we could not parse.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    /// No provider registered under the requested id.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    /// Whether a retry with backoff can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::Network(_)
        )
    }

    /// Stable kind label used in error events.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Auth(_) => "auth",
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::Network(_) => "network",
            ProviderError::MalformedResponse(_) => "malformed_response",
            ProviderError::UnknownProvider(_) => "unknown_provider",
        }
    }
}
