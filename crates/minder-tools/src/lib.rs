//! Tool registry and dispatcher for minder.
//!
//! Holds tool descriptors and enable/disable state, and executes calls
//! through an ordered safety pipeline: validation, denylist, confirmation
//! gating, and exclusive resource locking.

mod confirm;
mod denylist;
mod dispatch;
mod locks;
mod registry;
mod tool;
mod validate;

pub use confirm::ConfirmationBroker;
pub use denylist::check_denylist;
pub use dispatch::{CallOrigin, DispatchContext, ToolDispatcher, new_tool_call_id};
pub use locks::ResourceLocks;
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolDescriptor};
pub use validate::validate_arguments;
