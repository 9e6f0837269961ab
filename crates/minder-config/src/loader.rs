//! JSON5 config loading and validation.

use crate::{ConfigError, MinderConfig};
use log::{debug, info};
use std::fs;
use std::path::Path;

impl MinderConfig {
    /// Load a config from a JSON5 file on disk.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        info!("loading config from path: {}", path.as_ref().display());
        let contents = fs::read_to_string(path)?;
        Self::load_from_str(&contents)
    }

    /// Load a config from JSON5 contents.
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value: serde_json::Value = json5::from_str(contents)?;
        let config: MinderConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants that cannot be expressed in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::InvalidField {
                path: "agent.max_iterations".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.memory.max_short_term == 0 {
            return Err(ConfigError::InvalidField {
                path: "memory.max_short_term".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.memory.recall_k == 0 {
            return Err(ConfigError::InvalidField {
                path: "memory.recall_k".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::InvalidField {
                path: "model.temperature".to_string(),
                message: "must be between 0.0 and 2.0".to_string(),
            });
        }
        if self.scheduler.enabled && self.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidField {
                path: "scheduler.tick_interval_secs".to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{ConfigError, MinderConfig};
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn defaults_apply_to_empty_config() {
        let config = MinderConfig::load_from_str("{}").expect("load empty config");
        assert_eq!(config.agent.max_iterations, 25);
        assert_eq!(config.agent.tool_timeout_secs, 60);
        assert_eq!(config.memory.max_short_term, 50);
        assert_eq!(config.safety.blocked_commands.len(), 3);
        assert_eq!(config.scheduler.tick_interval_secs, 30);
        assert!(config.sessions.enabled);
    }

    #[test]
    fn json5_comments_and_partial_sections_parse() {
        let contents = r#"{
            // local model via ollama
            model: { provider: "ollama", name: "llama3.1" },
            memory: { max_short_term: 2 },
        }"#;
        let config = MinderConfig::load_from_str(contents).expect("load json5");
        assert_eq!(config.model.provider, "ollama");
        assert_eq!(config.memory.max_short_term, 2);
        // untouched sections keep defaults
        assert_eq!(config.agent.max_iterations, 25);
    }

    #[test]
    fn zero_iteration_cap_is_rejected() {
        let err = MinderConfig::load_from_str(r#"{ agent: { max_iterations: 0 } }"#)
            .expect_err("should reject");
        match err {
            ConfigError::InvalidField { path, .. } => {
                assert_eq!(path, "agent.max_iterations");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_from_path_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("minder.json5");
        fs::write(&path, r#"{ scheduler: { enabled: false } }"#).expect("write config");
        let config = MinderConfig::load_from_path(&path).expect("load from path");
        assert!(!config.scheduler.enabled);
    }

    #[test]
    fn builder_produces_validated_defaults() {
        let config = MinderConfig::builder().build();
        config.validate().expect("defaults validate");
    }
}
