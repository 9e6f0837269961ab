//! Configuration schema for minder.

use serde::{Deserialize, Serialize};

/// Root config for the minder core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MinderConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

impl MinderConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> MinderConfigBuilder {
        MinderConfigBuilder::new()
    }
}

/// Builder for assembling a `MinderConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct MinderConfigBuilder {
    config: MinderConfig,
}

impl MinderConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: MinderConfig::default(),
        }
    }

    /// Replace the model/provider configuration.
    pub fn model(mut self, model: ModelConfig) -> Self {
        self.config.model = model;
        self
    }

    /// Replace the agent loop configuration.
    pub fn agent(mut self, agent: AgentConfig) -> Self {
        self.config.agent = agent;
        self
    }

    /// Replace the memory configuration.
    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.config.memory = memory;
        self
    }

    /// Replace the safety configuration.
    pub fn safety(mut self, safety: SafetyConfig) -> Self {
        self.config.safety = safety;
        self
    }

    /// Replace the scheduler configuration.
    pub fn scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.config.scheduler = scheduler;
        self
    }

    /// Replace the session persistence configuration.
    pub fn sessions(mut self, sessions: SessionsConfig) -> Self {
        self.config.sessions = sessions;
        self
    }

    /// Finalize and return the built `MinderConfig`.
    pub fn build(self) -> MinderConfig {
        self.config
    }
}

/// Default model provider selection and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Overrides the provider's default endpoint (also how OpenRouter and
    /// other OpenAI-compatible gateways are selected).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_model_name(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: None,
            api_key: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

/// Agent loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum THINK/EXECUTE cycles per user turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Per tool-call execution timeout.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// How long a new turn waits for the session's execution lock.
    #[serde(default = "default_session_lock_timeout_secs")]
    pub session_lock_timeout_secs: u64,
    /// Provider retry attempt cap for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            session_lock_timeout_secs: default_session_lock_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_iterations() -> usize {
    25
}

fn default_tool_timeout_secs() -> u64 {
    60
}

fn default_session_lock_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

/// Memory tier bounds and storage location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Short-term buffer bound per session; eviction summarizes.
    #[serde(default = "default_max_short_term")]
    pub max_short_term: usize,
    /// Top-k memory records merged into context on recall.
    #[serde(default = "default_recall_k")]
    pub recall_k: usize,
    /// Upper bound on summary text length in characters.
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    /// Directory for memory record storage; defaults under the data root.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_short_term: default_max_short_term(),
            recall_k: default_recall_k(),
            summary_max_chars: default_summary_max_chars(),
            path: None,
        }
    }
}

fn default_max_short_term() -> usize {
    50
}

fn default_recall_k() -> usize {
    3
}

fn default_summary_max_chars() -> usize {
    2000
}

/// Confirmation gating and the command denylist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Whether confirmation-gated tools actually wait for approval.
    #[serde(default = "default_require_confirmation")]
    pub require_confirmation: bool,
    /// Substrings rejected in any string argument, never bypassable.
    #[serde(default = "default_blocked_commands")]
    pub blocked_commands: Vec<String>,
    /// How long a pending confirmation waits before resolving to denied.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// How long a tool call waits for a named resource lock.
    #[serde(default = "default_resource_lock_timeout_secs")]
    pub resource_lock_timeout_secs: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            require_confirmation: default_require_confirmation(),
            blocked_commands: default_blocked_commands(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            resource_lock_timeout_secs: default_resource_lock_timeout_secs(),
        }
    }
}

fn default_require_confirmation() -> bool {
    true
}

fn default_blocked_commands() -> Vec<String> {
    vec![
        "rm -rf /".to_string(),
        "format".to_string(),
        "mkfs".to_string(),
    ]
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_resource_lock_timeout_secs() -> u64 {
    120
}

/// Background task scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    /// Interval between tick() scans of the task queue.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Glob patterns naming confirmation-gated tools that headless task
    /// runs may use without a live user. Everything else is auto-denied.
    #[serde(default)]
    pub headless_allow: Vec<String>,
    /// SQLite file for the durable task queue; defaults under the data root.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            tick_interval_secs: default_tick_interval_secs(),
            headless_allow: Vec::new(),
            path: None,
        }
    }
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_tick_interval_secs() -> u64 {
    30
}

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_sessions_enabled")]
    pub enabled: bool,
    /// Directory for session rollout files; defaults under the data root.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            enabled: default_sessions_enabled(),
            path: None,
        }
    }
}

fn default_sessions_enabled() -> bool {
    true
}
