//! Tool executor: registry and built-in tools
//!
//! The answer pipeline advertises these tools to the LLM and executes at
//! most one call per turn through the registry.

pub mod builtin;
pub mod registry;

pub use builtin::register_builtin_tools;
pub use registry::{ToolExecutionResult, ToolHandler, ToolRegistry};
