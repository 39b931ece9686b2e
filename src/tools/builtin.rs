//! Built-in tools
//!
//! Provides core tools without needing external plugins.

use super::protocol::{ParameterDef, ToolArgs, ToolDefinition};
use super::{Tool, ToolFactory};
use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

type BuildFn = fn(Option<&str>) -> Result<Box<dyn Tool>, ToolError>;

/// Factory for a tool compiled into the binary
struct BuiltinFactory {
    name: &'static str,
    needs_model: bool,
    build: BuildFn,
}

impl ToolFactory for BuiltinFactory {
    fn name(&self) -> &str {
        self.name
    }

    fn needs_model_identifier(&self) -> bool {
        self.needs_model
    }

    fn create(&self, model: Option<&str>) -> Result<Box<dyn Tool>, ToolError> {
        (self.build)(model)
    }
}

/// Built-in tools that don't require external plugins
pub struct BuiltinTools;

impl BuiltinTools {
    /// Factories for every built-in tool
    pub fn factories() -> Vec<Box<dyn ToolFactory>> {
        vec![
            Box::new(BuiltinFactory {
                name: EchoTool::NAME,
                needs_model: false,
                build: |_| Ok(Box::new(EchoTool::new())),
            }),
            Box::new(BuiltinFactory {
                name: WaitTool::NAME,
                needs_model: false,
                build: |_| Ok(Box::new(WaitTool::new())),
            }),
            Box::new(BuiltinFactory {
                name: TextWriterTool::NAME,
                needs_model: false,
                build: |_| Ok(Box::new(TextWriterTool::new())),
            }),
            Box::new(BuiltinFactory {
                name: PromptBuilderTool::NAME,
                needs_model: true,
                build: |model| {
                    let model = model.ok_or_else(|| ToolError::InvalidArgument {
                        param: "model_string".to_string(),
                        reason: format!("{} requires a model identifier", PromptBuilderTool::NAME),
                    })?;
                    Ok(Box::new(PromptBuilderTool::new(model)))
                },
            }),
        ]
    }
}

/// Returns its keyword arguments unchanged
pub struct EchoTool {
    definition: ToolDefinition,
}

impl EchoTool {
    pub const NAME: &'static str = "Echo_Tool";

    pub fn new() -> Self {
        Self {
            definition: ToolDefinition {
                name: Self::NAME.to_string(),
                description: "Return the keyword arguments it was called with".to_string(),
                parameters: vec![],
                accepts_extra_params: true,
                requires_model: false,
            },
        }
    }
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn configure_output(&mut self, _dir: &Path) -> Result<(), ToolError> {
        Ok(())
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value, ToolError> {
        Ok(args.to_json())
    }
}

/// Sleeps for the requested number of seconds
pub struct WaitTool {
    definition: ToolDefinition,
}

impl WaitTool {
    pub const NAME: &'static str = "Wait_Tool";

    pub fn new() -> Self {
        Self {
            definition: ToolDefinition {
                name: Self::NAME.to_string(),
                description: "Wait for a number of seconds, then report how long it waited"
                    .to_string(),
                parameters: vec![ParameterDef::required(
                    "seconds",
                    "number",
                    "Seconds to wait",
                )],
                accepts_extra_params: false,
                requires_model: false,
            },
        }
    }
}

impl Default for WaitTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WaitTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn configure_output(&mut self, _dir: &Path) -> Result<(), ToolError> {
        Ok(())
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let seconds = args.require_f64("seconds")?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ToolError::InvalidArgument {
                param: "seconds".to_string(),
                reason: format!("must be a non-negative number, got {}", seconds),
            });
        }

        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(json!({ "waited": seconds }))
    }
}

/// Writes text files into the configured output directory
pub struct TextWriterTool {
    definition: ToolDefinition,
    output_dir: Option<PathBuf>,
}

impl TextWriterTool {
    pub const NAME: &'static str = "Text_Writer_Tool";

    pub fn new() -> Self {
        Self {
            definition: ToolDefinition {
                name: Self::NAME.to_string(),
                description: "Write text to a file inside the query output directory".to_string(),
                parameters: vec![
                    ParameterDef::required("filename", "string", "Relative file name"),
                    ParameterDef::required("content", "string", "Content to write"),
                    ParameterDef::optional(
                        "append",
                        "boolean",
                        "Append instead of overwrite",
                        json!(false),
                    ),
                ],
                accepts_extra_params: false,
                requires_model: false,
            },
            output_dir: None,
        }
    }

    /// Resolve a relative file name inside the output directory
    fn target_path(dir: &Path, filename: &str) -> Result<PathBuf, ToolError> {
        let relative = Path::new(filename);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if filename.trim().is_empty() || escapes {
            return Err(ToolError::InvalidArgument {
                param: "filename".to_string(),
                reason: format!("'{}' must be a relative path inside the output directory", filename),
            });
        }
        Ok(dir.join(relative))
    }
}

impl Default for TextWriterTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TextWriterTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn configure_output(&mut self, dir: &Path) -> Result<(), ToolError> {
        std::fs::create_dir_all(dir)?;
        self.output_dir = Some(dir.to_path_buf());
        Ok(())
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let dir = self.output_dir.as_deref().ok_or(ToolError::NotConfigured)?;
        let path = Self::target_path(dir, args.require_str("filename")?)?;
        let content = args.require_str("content")?;
        let append = args.get_bool("append", false);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        debug!("Wrote {} bytes to {:?}", content.len(), path);
        Ok(json!({
            "path": path.display().to_string(),
            "bytes": content.len(),
            "appended": append,
        }))
    }
}

/// Builds a prompt payload addressed to the configured model
pub struct PromptBuilderTool {
    definition: ToolDefinition,
    model: String,
}

impl PromptBuilderTool {
    pub const NAME: &'static str = "Prompt_Builder_Tool";

    pub fn new(model: &str) -> Self {
        Self {
            definition: ToolDefinition {
                name: Self::NAME.to_string(),
                description: "Build a prompt for the configured model from a query and context"
                    .to_string(),
                parameters: vec![
                    ParameterDef::required("query", "string", "Question to ask"),
                    ParameterDef::optional("context", "string", "Supporting context", json!("")),
                ],
                accepts_extra_params: false,
                requires_model: true,
            },
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Tool for PromptBuilderTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn configure_output(&mut self, _dir: &Path) -> Result<(), ToolError> {
        Ok(())
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let query = args.require_str("query")?;
        let prompt = match args.get_str("context").map(str::trim) {
            Some(context) if !context.is_empty() => {
                format!("Context: {}\n\nQuery: {}", context, query)
            }
            _ => format!("Query: {}", query),
        };

        Ok(json!({ "model": self.model, "prompt": prompt }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_args(params: &[(&str, Value)]) -> ToolArgs {
        params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_factories() {
        let factories = BuiltinTools::factories();
        assert_eq!(factories.len(), 4);
        let names: Vec<&str> = factories.iter().map(|f| f.name()).collect();
        assert!(names.contains(&"Echo_Tool"));
        assert!(names.contains(&"Text_Writer_Tool"));
    }

    #[test]
    fn test_prompt_builder_requires_model() {
        let factory = BuiltinTools::factories()
            .into_iter()
            .find(|f| f.name() == PromptBuilderTool::NAME)
            .unwrap();

        assert!(factory.needs_model_identifier());
        assert!(factory.create(None).is_err());
        assert!(factory.create(Some("gpt-4o")).is_ok());
    }

    #[tokio::test]
    async fn test_echo_returns_args() {
        let tool = EchoTool::new();
        let args = make_args(&[("image", json!("x.png")), ("labels", json!(["baseball"]))]);

        let result = tool.execute(args).await.unwrap();
        assert_eq!(result, json!({"image": "x.png", "labels": ["baseball"]}));
    }

    #[tokio::test]
    async fn test_wait_tool() {
        let tool = WaitTool::new();
        let result = tool
            .execute(make_args(&[("seconds", json!(0))]))
            .await
            .unwrap();
        assert_eq!(result, json!({"waited": 0.0}));
    }

    #[tokio::test]
    async fn test_wait_tool_rejects_negative() {
        let tool = WaitTool::new();
        let result = tool.execute(make_args(&[("seconds", json!(-1))])).await;
        assert!(matches!(result, Err(ToolError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_text_writer_requires_configuration() {
        let tool = TextWriterTool::new();
        let result = tool
            .execute(make_args(&[("filename", json!("a.txt")), ("content", json!("x"))]))
            .await;
        assert!(matches!(result, Err(ToolError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_text_writer_writes_and_appends() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("query");
        let mut tool = TextWriterTool::new();
        tool.configure_output(&out).unwrap();
        assert!(out.is_dir());

        tool.execute(make_args(&[
            ("filename", json!("notes/a.txt")),
            ("content", json!("hello")),
        ]))
        .await
        .unwrap();
        let result = tool
            .execute(make_args(&[
                ("filename", json!("notes/a.txt")),
                ("content", json!(" world")),
                ("append", json!(true)),
            ]))
            .await
            .unwrap();

        assert_eq!(result["appended"], json!(true));
        let written = std::fs::read_to_string(out.join("notes/a.txt")).unwrap();
        assert_eq!(written, "hello world");
    }

    #[tokio::test]
    async fn test_text_writer_rejects_escape() {
        let temp_dir = TempDir::new().unwrap();
        let mut tool = TextWriterTool::new();
        tool.configure_output(temp_dir.path()).unwrap();

        for name in ["../outside.txt", "/etc/passwd", ""] {
            let result = tool
                .execute(make_args(&[("filename", json!(name)), ("content", json!("x"))]))
                .await;
            assert!(
                matches!(result, Err(ToolError::InvalidArgument { .. })),
                "accepted {:?}",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_prompt_builder() {
        let tool = PromptBuilderTool::new("gpt-4o");
        let result = tool
            .execute(make_args(&[
                ("query", json!("How many?")),
                ("context", json!("Two balls")),
            ]))
            .await
            .unwrap();

        assert_eq!(result["model"], json!("gpt-4o"));
        assert_eq!(
            result["prompt"],
            json!("Context: Two balls\n\nQuery: How many?")
        );
    }
}
