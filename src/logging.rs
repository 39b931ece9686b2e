//! Audit trail for executed tool commands
//!
//! Every command run through the executor is appended as one JSON line to
//! the audit file inside the current query cache directory.

use crate::config::LoggingConfig;
use crate::runner::BlockOutcome;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use uuid::Uuid;

/// Session ID for the current process
static SESSION_ID: Lazy<String> = Lazy::new(|| Uuid::new_v4().to_string());

/// Secret patterns for redaction
static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Keyword arguments and bindings that look like credentials
        Regex::new(
            r#"(?i)(api[_-]?key|token|secret|password|passwd|pwd)\s*[=:]\s*['"]?([^'"\s,)]+)['"]?"#,
        )
        .unwrap(),
        // Bearer tokens
        Regex::new(r"(?i)bearer\s+[a-zA-Z0-9._-]+").unwrap(),
        // AWS keys
        Regex::new(r"AKIA[A-Z0-9]{16}").unwrap(),
        // Provider-style secret keys
        Regex::new(r"sk-[a-zA-Z0-9_-]{16,}").unwrap(),
    ]
});

const MAX_PREVIEW: usize = 500;

/// Log entry structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: LogEvent,
    /// Tool name as requested
    pub tool: String,
    /// Command text, redacted when configured
    pub command: String,
    /// Number of blocks that produced an outcome
    pub blocks: usize,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub outcomes: Vec<OutcomeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Types of log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    /// Every block produced an outcome
    Execute,
    /// The command was aborted
    Error,
}

/// Short record of one block outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeSummary {
    /// completed, not_captured or timed_out
    pub status: String,
    pub preview: String,
}

impl OutcomeSummary {
    fn from_outcome(outcome: &BlockOutcome, redact: bool) -> Self {
        let status = match outcome {
            BlockOutcome::Completed(_) => "completed",
            BlockOutcome::NotCaptured { .. } => "not_captured",
            BlockOutcome::TimedOut { .. } => "timed_out",
        };
        let text = outcome.to_string();
        let text = if redact { redact_secrets(&text) } else { text };
        Self {
            status: status.to_string(),
            preview: truncate_preview(&text, MAX_PREVIEW),
        }
    }
}

/// Appends command records to `<dir>/<audit_file>`
#[derive(Debug, Clone)]
pub struct AuditLogger {
    config: LoggingConfig,
    path: PathBuf,
}

impl AuditLogger {
    /// Create a logger writing into `dir`
    pub fn new(config: LoggingConfig, dir: &Path) -> Self {
        let path = dir.join(&config.audit_file);
        Self { config, path }
    }

    /// Point the logger at a new query cache directory
    pub fn set_directory(&mut self, dir: &Path) {
        self.path = dir.join(&self.config.audit_file);
    }

    /// Log a command whose blocks all produced outcomes
    pub fn log_execution(
        &self,
        tool: &str,
        command: &str,
        outcomes: &[BlockOutcome],
        duration_ms: u64,
    ) {
        if !self.config.audit {
            return;
        }

        let entry = LogEntry {
            session_id: SESSION_ID.clone(),
            timestamp: Utc::now(),
            event: LogEvent::Execute,
            tool: tool.to_string(),
            command: self.redact_if_needed(command),
            blocks: outcomes.len(),
            outcomes: outcomes
                .iter()
                .map(|o| OutcomeSummary::from_outcome(o, self.config.redact_secrets))
                .collect(),
            error: None,
            duration_ms,
        };

        self.write_entry(&entry);
    }

    /// Log an aborted command
    pub fn log_error(&self, tool: &str, command: &str, error: &str, duration_ms: u64) {
        if !self.config.audit {
            return;
        }

        let entry = LogEntry {
            session_id: SESSION_ID.clone(),
            timestamp: Utc::now(),
            event: LogEvent::Error,
            tool: tool.to_string(),
            command: self.redact_if_needed(command),
            blocks: 0,
            outcomes: vec![],
            error: Some(self.redact_if_needed(error)),
            duration_ms,
        };

        self.write_entry(&entry);
    }

    /// Append one entry; failures are logged, never raised
    fn write_entry(&self, entry: &LogEntry) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create audit log directory: {}", e);
                return;
            }
        }

        let json = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize log entry: {}", e);
                return;
            }
        };

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", json));
        match result {
            Ok(()) => debug!("Audit entry written to {:?}", self.path),
            Err(e) => error!("Failed to write audit entry to {:?}: {}", self.path, e),
        }
    }

    fn redact_if_needed(&self, text: &str) -> String {
        if self.config.redact_secrets {
            redact_secrets(text)
        } else {
            text.to_string()
        }
    }
}

/// Redact secrets from text
pub fn redact_secrets(text: &str) -> String {
    let mut result = text.to_string();

    for pattern in SECRET_PATTERNS.iter() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }

    result
}

/// Truncate text to at most `max_chars` characters, marking the cut
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...[truncated]", &text[..cut]),
        None => text.to_string(),
    }
}
