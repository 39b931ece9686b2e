//! Error types for toolexec

use thiserror::Error;

/// Main error type for tool command execution
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("{0}")]
    Resolution(#[from] ResolutionError),

    #[error("Invalid command: {0}")]
    Script(#[from] ScriptError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while mapping a tool name to a ready-to-use instance
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("No tool registered for '{name}' (looked up as '{key}')")]
    NotFound { name: String, key: String },

    #[error("Failed to construct tool '{name}': {reason}")]
    Construction { name: String, reason: String },

    #[error("Failed to configure output directory for '{name}': {reason}")]
    Configuration { name: String, reason: String },
}

/// Errors raised while parsing or evaluating a command block
#[derive(Error, Debug, PartialEq)]
pub enum ScriptError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("name '{0}' is not defined")]
    UnboundName(String),

    #[error("{0}")]
    Evaluation(String),

    #[error("'{0}' has no execute operation")]
    NotInvocable(String),
}

/// Errors raised by tool implementations
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Unexpected keyword argument '{param}' for {tool}")]
    UnknownParameter { tool: String, param: String },

    #[error("Invalid argument '{param}': {reason}")]
    InvalidArgument { param: String, reason: String },

    #[error("Output directory has not been configured")]
    NotConfigured,

    #[error("{0}")]
    Failed(String),

    #[error("Plugin protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}
