//! Tool command execution
//!
//! Resolves a tool, configures its output directory, splits the command
//! into blocks and runs them one at a time. A timed-out block keeps its
//! slot in the result list; any other failure aborts the whole command.

use crate::config::{Config, ExecutorConfig};
use crate::error::{ExecutorError, ResolutionError};
use crate::logging::{truncate_preview, AuditLogger};
use crate::response::normalize_command;
use crate::runner::{run_block, BlockOutcome};
use crate::splitter::split_commands;
use crate::tools::{Tool, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// What a caller receives for one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandOutput {
    /// One value per block, in block order
    Results(Vec<Value>),
    /// Aggregate error replacing the whole result list
    Error(String),
}

impl CommandOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, CommandOutput::Error(_))
    }

    /// Cap every result at `max_chars` characters for display.
    ///
    /// Oversized non-string results are replaced by their truncated JSON text.
    pub fn truncated(self, max_chars: usize) -> Self {
        match self {
            CommandOutput::Results(values) => CommandOutput::Results(
                values
                    .into_iter()
                    .map(|value| truncate_value(value, max_chars))
                    .collect(),
            ),
            error => error,
        }
    }
}

fn truncate_value(value: Value, max_chars: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_preview(&s, max_chars)),
        other => {
            let text = other.to_string();
            if text.chars().count() > max_chars {
                Value::String(truncate_preview(&text, max_chars))
            } else {
                other
            }
        }
    }
}

/// Runs tool commands against tools from a registry
pub struct Executor {
    config: ExecutorConfig,
    registry: ToolRegistry,
    query_cache_dir: PathBuf,
    audit: AuditLogger,
}

impl Executor {
    pub fn new(config: Config, registry: ToolRegistry) -> Self {
        let query_cache_dir = config.executor.root_cache_dir.clone();
        let audit = AuditLogger::new(config.logging, &query_cache_dir);
        Self {
            config: config.executor,
            registry,
            query_cache_dir,
            audit,
        }
    }

    /// Set and create the directory tools write their output into.
    ///
    /// Without an explicit directory a timestamped one is created under
    /// the root cache directory.
    pub fn set_query_cache_dir(&mut self, dir: Option<PathBuf>) -> Result<&Path, ExecutorError> {
        let dir = dir.unwrap_or_else(|| {
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
            self.config.root_cache_dir.join(stamp)
        });

        std::fs::create_dir_all(&dir)?;
        debug!("Query cache directory set to {:?}", dir);

        self.audit.set_directory(&dir);
        self.query_cache_dir = dir;
        Ok(&self.query_cache_dir)
    }

    /// Resolve, construct and configure the tool for one command
    fn prepare_tool(&self, tool_name: &str) -> Result<Box<dyn Tool>, ResolutionError> {
        let factory = self.registry.resolve(tool_name)?;

        let model = if factory.needs_model_identifier() {
            Some(self.config.llm_engine.as_str())
        } else {
            None
        };

        let mut tool = factory
            .create(model)
            .map_err(|e| ResolutionError::Construction {
                name: tool_name.to_string(),
                reason: e.to_string(),
            })?;

        tool.configure_output(&self.query_cache_dir)
            .map_err(|e| ResolutionError::Configuration {
                name: tool_name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(tool)
    }

    /// Run every block of `command` with `tool_name`.
    ///
    /// Returns one outcome per block. The first non-timeout failure
    /// discards the outcomes collected so far.
    pub async fn execute_tool_command(
        &self,
        tool_name: &str,
        command: &str,
    ) -> Result<Vec<BlockOutcome>, ExecutorError> {
        let started = Instant::now();
        let result = self.execute_blocks(tool_name, command).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(outcomes) => {
                self.audit
                    .log_execution(tool_name, command, outcomes, duration_ms);
            }
            Err(e) => {
                self.audit
                    .log_error(tool_name, command, &e.to_string(), duration_ms);
            }
        }

        result
    }

    async fn execute_blocks(
        &self,
        tool_name: &str,
        command: &str,
    ) -> Result<Vec<BlockOutcome>, ExecutorError> {
        let tool = self.prepare_tool(tool_name)?;
        let blocks = split_commands(&normalize_command(command));
        let max_time = Duration::from_secs(self.config.max_time);

        if blocks.is_empty() {
            debug!("No invocation found in command for '{}'", tool_name);
        }

        let mut outcomes = Vec::with_capacity(blocks.len());
        for block in &blocks {
            if self.config.verbose {
                info!("Executing block {}:\n{}", block.index, block);
            }

            let outcome = run_block(block, tool.as_ref(), max_time).await?;

            if self.config.verbose {
                info!("Block {} result: {}", block.index, outcome);
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// Run a command and flatten the outcome to the caller-facing shape
    pub async fn run_tool_command(&self, tool_name: &str, command: &str) -> CommandOutput {
        match self.execute_tool_command(tool_name, command).await {
            Ok(outcomes) => {
                CommandOutput::Results(outcomes.into_iter().map(BlockOutcome::into_value).collect())
            }
            Err(e) => {
                error!("Command for '{}' failed: {}", tool_name, e);
                CommandOutput::Error(format!("Error in execute_tool_command: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;
    use crate::logging::LogEntry;
    use serde_json::json;
    use tempfile::TempDir;

    fn executor(temp_dir: &TempDir, max_time: u64) -> Executor {
        let config = Config {
            executor: ExecutorConfig {
                root_cache_dir: temp_dir.path().to_path_buf(),
                max_time,
                ..Default::default()
            },
            ..Default::default()
        };
        Executor::new(config, ToolRegistry::with_builtins())
    }

    #[tokio::test]
    async fn test_single_invocation() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, 5);

        let output = executor
            .run_tool_command(
                "Echo_Tool",
                r#"execution = tool.execute(image="x.png", labels=["baseball"])"#,
            )
            .await;

        assert_eq!(
            output,
            CommandOutput::Results(vec![json!({"image": "x.png", "labels": ["baseball"]})])
        );
    }

    #[tokio::test]
    async fn test_blocks_run_independently() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, 5);

        let command = (1..=3)
            .map(|n| {
                format!(
                    r#"execution = tool.execute(image="img{}", labels=["baseball"], threshold=0.5)"#,
                    n
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let outcomes = executor
            .execute_tool_command("echo", &command)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(
                outcome,
                &BlockOutcome::Completed(json!({
                    "image": format!("img{}", i + 1),
                    "labels": ["baseball"],
                    "threshold": 0.5,
                }))
            );
        }
    }

    #[tokio::test]
    async fn test_preparation_statements_are_visible() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, 5);

        let command = "image = \"p\"\nlabels = [\"baseball\", \"football\"]\nthreshold = 0.5\nexecution = tool.execute(image=image, labels=labels, threshold=threshold)";
        let output = executor.run_tool_command("Echo_Tool", command).await;

        assert_eq!(
            output,
            CommandOutput::Results(vec![json!({
                "image": "p",
                "labels": ["baseball", "football"],
                "threshold": 0.5,
            })])
        );
    }

    #[tokio::test]
    async fn test_timeout_keeps_its_slot() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, 1);

        let command = "execution = tool.execute(seconds=0)\nexecution = tool.execute(seconds=10)\nexecution = tool.execute(seconds=0.1)";
        let started = Instant::now();
        let output = executor.run_tool_command("Wait_Tool", command).await;

        assert_eq!(
            output,
            CommandOutput::Results(vec![
                json!({"waited": 0.0}),
                json!("Execution timed out after 1 seconds"),
                json!({"waited": 0.1}),
            ])
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_aggregate_error() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, 5);

        for command in ["execution = tool.execute(a=1)", "", "x = 1"] {
            let output = executor.run_tool_command("Missing_Tool", command).await;
            match output {
                CommandOutput::Error(message) => {
                    assert!(message.starts_with("Error in execute_tool_command: "));
                    assert!(message.contains("Missing_Tool"));
                }
                other => panic!("expected an error, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_block_failure_discards_earlier_results() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, 5);

        let command = "execution = tool.execute(a=1)\nexecution = tool.execute(a=missing)\nexecution = tool.execute(a=3)";
        let output = executor.run_tool_command("Echo_Tool", command).await;

        assert_eq!(
            output,
            CommandOutput::Error(
                "Error in execute_tool_command: Invalid command: name 'missing' is not defined"
                    .to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_hostile_expressions_are_aggregate_errors() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, 5);

        let deep = format!(
            "x = {}1{}\nexecution = tool.execute(x=x)",
            "[".repeat(20_000),
            "]".repeat(20_000)
        );
        for command in [
            "x = 'ab' * 9223372036854775807\nexecution = tool.execute(x=x)",
            "x = [0] * 4000000000\nexecution = tool.execute(x=x)",
            deep.as_str(),
        ] {
            let output = executor.run_tool_command("Echo_Tool", command).await;
            match output {
                CommandOutput::Error(message) => {
                    assert!(message.starts_with("Error in execute_tool_command: Invalid command: "))
                }
                other => panic!("expected an error, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_no_invocation_is_empty_result() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, 5);

        let output = executor
            .run_tool_command("Echo_Tool", "No command found.")
            .await;
        assert_eq!(output, CommandOutput::Results(vec![]));
    }

    #[tokio::test]
    async fn test_fenced_command_is_normalized() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, 5);

        let output = executor
            .run_tool_command("Echo_Tool", "```python\nexecution = tool.execute(n=2 * 3)\n```")
            .await;
        assert_eq!(output, CommandOutput::Results(vec![json!({"n": 6})]));
    }

    #[tokio::test]
    async fn test_model_identifier_injected_when_needed() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir, 5);

        let output = executor
            .run_tool_command(
                "prompt_builder_tool",
                r#"execution = tool.execute(query="What is shown?")"#,
            )
            .await;
        assert_eq!(
            output,
            CommandOutput::Results(vec![json!({
                "model": "gpt-4o",
                "prompt": "Query: What is shown?",
            })])
        );
    }

    #[tokio::test]
    async fn test_tool_writes_into_query_cache_dir() {
        let temp_dir = TempDir::new().unwrap();
        let mut executor = executor(&temp_dir, 5);
        let query_dir = temp_dir.path().join("query_1");
        executor.set_query_cache_dir(Some(query_dir.clone())).unwrap();

        let output = executor
            .run_tool_command(
                "Text_Writer_Tool",
                "text = \"hello\"\nexecution = tool.execute(filename=\"out.txt\", content=text)",
            )
            .await;

        assert!(!output.is_error());
        assert_eq!(
            std::fs::read_to_string(query_dir.join("out.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_default_query_cache_dir_is_timestamped() {
        let temp_dir = TempDir::new().unwrap();
        let mut executor = executor(&temp_dir, 5);

        let dir = executor.set_query_cache_dir(None).unwrap().to_path_buf();
        assert!(dir.is_dir());
        assert_eq!(dir.parent(), Some(temp_dir.path()));

        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name.len(), "20240101_120000".len());
        assert_eq!(name.as_bytes()[8], b'_');
    }

    #[tokio::test]
    async fn test_commands_are_audited() {
        let temp_dir = TempDir::new().unwrap();
        let mut executor = executor(&temp_dir, 5);
        let query_dir = temp_dir.path().join("audited");
        executor.set_query_cache_dir(Some(query_dir.clone())).unwrap();

        executor
            .run_tool_command("Echo_Tool", "execution = tool.execute(a=1)")
            .await;
        executor
            .run_tool_command("Missing_Tool", "execution = tool.execute(a=1)")
            .await;

        let log = std::fs::read_to_string(query_dir.join(LoggingConfig::default().audit_file))
            .unwrap();
        let entries: Vec<LogEntry> = log
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].blocks, 1);
        assert!(entries[1].error.is_some());
    }

    #[test]
    fn test_display_truncation() {
        let output = CommandOutput::Results(vec![
            json!("abcdefgh"),
            json!({"k": "a long value"}),
            json!(1),
        ])
        .truncated(4);

        assert_eq!(
            output,
            CommandOutput::Results(vec![
                json!("abcd...[truncated]"),
                json!("{\"k\"...[truncated]"),
                json!(1),
            ])
        );

        let error = CommandOutput::Error("a long error message".to_string());
        assert_eq!(error.clone().truncated(3), error);
    }

    #[test]
    fn test_command_output_serialization() {
        assert_eq!(
            serde_json::to_string(&CommandOutput::Results(vec![json!(1), json!("x")])).unwrap(),
            r#"[1,"x"]"#
        );
        assert_eq!(
            serde_json::to_string(&CommandOutput::Error("boom".to_string())).unwrap(),
            r#""boom""#
        );
    }
}
