//! Timed block execution
//!
//! A block runs inside `tokio::time::timeout`. The deadline belongs to the
//! call: it is dropped with the future on every exit path, so a later
//! block never inherits it and independent callers never share one.

use crate::error::ExecutorError;
use crate::script::{parse_script, Scope};
use crate::splitter::ExecutionBlock;
use crate::tools::Tool;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Name the tool handle is bound to inside every block
pub const HANDLE_NAME: &str = "tool";

/// Name an invocation's result must be assigned to
pub const RESULT_NAME: &str = "execution";

/// What one block produced
#[derive(Debug, Clone, PartialEq)]
pub enum BlockOutcome {
    /// The value bound to the result name
    Completed(Value),
    /// The block finished without binding a result
    NotCaptured { block: String },
    /// The deadline fired before the block finished
    TimedOut { limit: Duration },
}

impl BlockOutcome {
    /// The value reported to callers; sentinels become their text
    pub fn into_value(self) -> Value {
        match self {
            BlockOutcome::Completed(value) => value,
            other => Value::String(other.to_string()),
        }
    }
}

impl fmt::Display for BlockOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockOutcome::Completed(value) => write!(f, "{}", value),
            BlockOutcome::NotCaptured { block } => {
                write!(f, "No execution captured from block: {}", block)
            }
            BlockOutcome::TimedOut { limit } => {
                write!(f, "Execution timed out after {} seconds", format_limit(*limit))
            }
        }
    }
}

impl Serialize for BlockOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BlockOutcome::Completed(value) => value.serialize(serializer),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

fn format_limit(limit: Duration) -> String {
    if limit.subsec_nanos() == 0 {
        limit.as_secs().to_string()
    } else {
        format!("{}", limit.as_secs_f64())
    }
}

/// Run one block against `tool` with a fresh scope and a deadline.
///
/// Timeouts become [`BlockOutcome::TimedOut`]; every other failure is
/// returned as an error for the caller to handle.
pub async fn run_block(
    block: &ExecutionBlock,
    tool: &dyn Tool,
    max_time: Duration,
) -> Result<BlockOutcome, ExecutorError> {
    let script = parse_script(&block.source)?;
    let mut scope = Scope::new(HANDLE_NAME, tool);

    debug!(
        "Running block {} ({} statement(s), limit {:?})",
        block.index,
        script.statements.len(),
        max_time
    );

    match tokio::time::timeout(max_time, scope.run(&script)).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(
                "Block {} timed out after {:?}",
                block.index, max_time
            );
            return Ok(BlockOutcome::TimedOut { limit: max_time });
        }
    }

    Ok(match scope.get(RESULT_NAME) {
        Some(value) if !value.is_null() => BlockOutcome::Completed(value.clone()),
        _ => BlockOutcome::NotCaptured {
            block: block.source.clone(),
        },
    })
}
