//! Configuration schema, builder, and JSON5 loader for minder.

mod error;
mod loader;
mod model;

pub use error::ConfigError;
pub use model::{
    AgentConfig, MemoryConfig, MinderConfig, MinderConfigBuilder, ModelConfig, SafetyConfig,
    SchedulerConfig, SessionsConfig,
};
