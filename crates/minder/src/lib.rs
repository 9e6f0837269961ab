//! Public SDK surface for minder.
//!
//! This crate re-exports the building blocks and provides a small
//! initialization helper to keep consumer setup consistent.

/// Re-export for convenience.
pub use minder_config as config;
pub use minder_core as core;
/// Re-export for convenience.
pub use minder_memory as memory;
/// Re-export for convenience.
pub use minder_protocol as protocol;
pub use minder_router as router;
/// Re-export for convenience.
pub use minder_tools as tools;

pub use minder_core::Orchestrator;

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// This is a no-op if the feature is not enabled. Binaries are still expected
/// to call this early in startup to ensure log output is wired up.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
}
