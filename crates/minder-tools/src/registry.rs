//! Registry for tool implementations with runtime enable/disable state.

use crate::tool::{Tool, ToolDescriptor};
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// In-memory registry for tool implementations.
///
/// Registration happens once at startup; the enabled flag is the only
/// mutable part at runtime.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
    disabled: Arc<RwLock<HashSet<String>>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool by name. Tools start enabled.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        debug!("registering tool (name={})", tool.name());
        self.tools.write().insert(tool.name().to_string(), tool);
    }

    /// Fetch a tool by name, regardless of enabled state.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// Whether the named tool is currently enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        !self.disabled.read().contains(name)
    }

    /// Flip the enabled flag for a tool. Returns false for unknown names.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        if !self.tools.read().contains_key(name) {
            return false;
        }
        info!("tool toggled (name={}, enabled={})", name, enabled);
        let mut disabled = self.disabled.write();
        if enabled {
            disabled.remove(name);
        } else {
            disabled.insert(name.to_string());
        }
        true
    }

    /// Descriptors for registered tools, optionally only enabled ones.
    pub fn list(&self, enabled_only: bool) -> Vec<ToolDescriptor> {
        let tools = self.tools.read();
        let disabled = self.disabled.read();
        let mut descriptors: Vec<ToolDescriptor> = tools
            .values()
            .filter(|tool| !enabled_only || !disabled.contains(tool.name()))
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameter_schema: tool.parameter_schema(),
                enabled: !disabled.contains(tool.name()),
                requires_confirmation: tool.requires_confirmation(),
            })
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }
}
