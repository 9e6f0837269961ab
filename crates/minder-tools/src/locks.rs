//! Named exclusive resource locks shared by live sessions and headless
//! task runs.
//!
//! A lock is held only for the duration of one tool handler call and is
//! released on every exit path, including failure. Acquisition is bounded
//! by a timeout that fails the tool call rather than deadlocking.

use log::{debug, warn};
use minder_protocol::ToolError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of named exclusive locks (browser instance, terminal session,
/// file-sandbox root).
#[derive(Default, Clone)]
pub struct ResourceLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, resource: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(resource.to_string())
            .or_default()
            .clone()
    }

    /// Acquire the named lock, waiting at most `timeout`.
    pub async fn acquire(
        &self,
        resource: &str,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, ToolError> {
        let lock = self.entry(resource);
        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => {
                debug!("resource lock acquired (resource={})", resource);
                Ok(guard)
            }
            Err(_) => {
                warn!(
                    "resource lock wait timed out (resource={}, timeout_ms={})",
                    resource,
                    timeout.as_millis()
                );
                Err(ToolError::ExecutionFailed(format!(
                    "timed out waiting for resource '{resource}'"
                )))
            }
        }
    }
}
