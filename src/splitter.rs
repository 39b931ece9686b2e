//! Command splitting
//!
//! Blocks do not share bindings, so every invocation line takes all the
//! text since the previous invocation with it. Preparation statements
//! therefore always land in the same block as the call that uses them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::debug;

/// Lazily matches up to and including the next single-line invocation
static INVOCATION_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s).*?execution\s*=\s*[A-Za-z_][A-Za-z0-9_]*\.execute\([^\n]*\)\s*(?:\n|$)")
        .unwrap()
});

/// One independently executable unit of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionBlock {
    /// Position of the block in its command, starting at 0
    pub index: usize,
    /// Statements of the block, ending with the invocation
    pub source: String,
}

impl fmt::Display for ExecutionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Split normalized command text into execution blocks.
///
/// A command with k invocation lines yields k blocks; text after the last
/// invocation is not part of any block.
pub fn split_commands(command: &str) -> Vec<ExecutionBlock> {
    let mut blocks = Vec::new();
    let mut consumed = 0;

    for m in INVOCATION_BLOCK.find_iter(command) {
        consumed = m.end();
        let source = m.as_str().trim();
        if source.is_empty() {
            continue;
        }
        blocks.push(ExecutionBlock {
            index: blocks.len(),
            source: source.to_string(),
        });
    }

    let trailing = command[consumed..].trim();
    if !trailing.is_empty() {
        debug!(
            "Ignoring {} trailing character(s) after the last invocation",
            trailing.len()
        );
    }

    blocks
}
