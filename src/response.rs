//! Response parsing
//!
//! Extracts the analysis, explanation and command text from a model
//! response, which arrives either as a structured record or as free text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const NO_ANALYSIS: &str = "No analysis found.";
pub const NO_EXPLANATION: &str = "No explanation found.";
pub const NO_COMMAND: &str = "No command found.";

// Each section ends at the next marker, or at the end of the text when later markers are absent
static ANALYSIS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Analysis:(.*?)(?:Command Explanation|Generated Command|\z)").unwrap()
});

static EXPLANATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Command Explanation:(.*?)(?:Generated Command|\z)").unwrap()
});

static COMMAND_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Generated Command:.*?```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").unwrap()
});

static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```(?:[A-Za-z0-9_+-]*[ \t]*(?:\r?\n|$))?").unwrap());

/// The three logical fields of a tool-command response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub analysis: String,
    pub explanation: String,
    pub command: String,
}

/// A model response in one of the accepted shapes
#[derive(Debug, Clone)]
pub enum ToolResponse {
    Structured(ToolCommand),
    Text(String),
}

impl From<ToolCommand> for ToolResponse {
    fn from(command: ToolCommand) -> Self {
        ToolResponse::Structured(command)
    }
}

impl From<&str> for ToolResponse {
    fn from(text: &str) -> Self {
        ToolResponse::Text(text.to_string())
    }
}

impl From<String> for ToolResponse {
    fn from(text: String) -> Self {
        ToolResponse::Text(text)
    }
}

/// Extract a [`ToolCommand`] from a response. Never fails: missing
/// sections are filled with their fallback text.
pub fn extract_explanation_and_command(response: impl Into<ToolResponse>) -> ToolCommand {
    let parsed = match response.into() {
        ToolResponse::Structured(command) => trimmed(command),
        ToolResponse::Text(text) => match serde_json::from_str::<ToolCommand>(&text) {
            Ok(command) => trimmed(command),
            Err(e) => {
                if text.trim_start().starts_with('{') {
                    warn!("Failed to parse response as JSON: {}", e);
                } else {
                    debug!("Response is not JSON ({}), scanning free text", e);
                }
                parse_free_text(&text)
            }
        },
    };

    ToolCommand {
        command: normalize_command(&parsed.command),
        ..parsed
    }
}

fn trimmed(command: ToolCommand) -> ToolCommand {
    ToolCommand {
        analysis: command.analysis.trim().to_string(),
        explanation: command.explanation.trim().to_string(),
        command: command.command.trim().to_string(),
    }
}

/// Scan free text for the Analysis / Command Explanation / Generated Command sections
fn parse_free_text(text: &str) -> ToolCommand {
    let capture = |pattern: &Regex, fallback: &str| {
        pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| fallback.to_string())
    };

    ToolCommand {
        analysis: capture(&ANALYSIS_PATTERN, NO_ANALYSIS),
        explanation: capture(&EXPLANATION_PATTERN, NO_EXPLANATION),
        command: capture(&COMMAND_PATTERN, NO_COMMAND),
    }
}

/// Strip code-fence decoration and surrounding whitespace from command text.
///
/// Repeats until nothing changes, so `normalize_command(normalize_command(x))`
/// always equals `normalize_command(x)`.
pub fn normalize_command(code: &str) -> String {
    let mut current = code.trim().to_string();
    loop {
        let without_open = FENCE_OPEN.replace(&current, "");
        let next = without_open.trim_end().trim_end_matches('`').trim().to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}
