//! Tool system for toolexec
//!
//! A tool is resolved by name through the [`ToolRegistry`], constructed by
//! its [`ToolFactory`], pointed at an output directory, and then invoked
//! once per command block. Built-in tools live in-process; plugins are
//! external executables that speak JSON over stdin/stdout.

mod builtin;
mod external;
mod protocol;
mod registry;

#[cfg(test)]
pub use builtin::{EchoTool, TextWriterTool, WaitTool};
pub use protocol::{ToolArgs, ToolDefinition};
pub use registry::ToolRegistry;

use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

/// A constructed, ready-to-use tool instance
#[async_trait]
pub trait Tool: Send + Sync {
    /// Declared metadata, including parameter names
    fn definition(&self) -> &ToolDefinition;

    /// Set where the tool writes its artifacts. Called once before any block runs.
    fn configure_output(&mut self, dir: &Path) -> Result<(), ToolError>;

    /// Run the tool with keyword arguments
    async fn execute(&self, args: ToolArgs) -> Result<Value, ToolError>;
}

/// Builds tool instances for one registry entry
pub trait ToolFactory: Send + Sync {
    /// Canonical tool name
    fn name(&self) -> &str;

    /// Whether `create` must be given a model identifier
    fn needs_model_identifier(&self) -> bool;

    fn create(&self, model: Option<&str>) -> Result<Box<dyn Tool>, ToolError>;
}
