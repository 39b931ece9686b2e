//! External plugin tools
//!
//! Handles spawning plugin processes and communicating with them. Each
//! invocation spawns the plugin, writes one JSON request line to its stdin
//! and waits for the response line carrying the same request id.

use super::protocol::{PluginRequest, PluginResponse, ToolArgs, ToolDefinition};
use super::{Tool, ToolFactory};
use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Factory for one tool declared in a plugin manifest
pub struct ExternalToolFactory {
    definition: ToolDefinition,
    executable: PathBuf,
}

impl ExternalToolFactory {
    pub fn new(definition: ToolDefinition, executable: PathBuf) -> Self {
        Self {
            definition,
            executable,
        }
    }
}

impl ToolFactory for ExternalToolFactory {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn needs_model_identifier(&self) -> bool {
        self.definition.requires_model
    }

    fn create(&self, model: Option<&str>) -> Result<Box<dyn Tool>, ToolError> {
        if !self.executable.exists() {
            return Err(ToolError::Failed(format!(
                "plugin executable missing: {}",
                self.executable.display()
            )));
        }
        Ok(Box::new(ExternalTool {
            definition: self.definition.clone(),
            executable: self.executable.clone(),
            model: model.map(str::to_string),
            output_dir: None,
        }))
    }
}

/// A tool backed by a plugin executable
pub struct ExternalTool {
    definition: ToolDefinition,
    executable: PathBuf,
    model: Option<String>,
    output_dir: Option<PathBuf>,
}

impl ExternalTool {
    fn request(&self, args: &ToolArgs) -> PluginRequest {
        let mut request = PluginRequest::new(&self.definition.name, args);
        request.output_dir = self
            .output_dir
            .as_ref()
            .map(|dir| dir.display().to_string());
        request.model = self.model.clone();
        request
    }
}

#[async_trait]
impl Tool for ExternalTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn configure_output(&mut self, dir: &Path) -> Result<(), ToolError> {
        std::fs::create_dir_all(dir)?;
        self.output_dir = Some(dir.to_path_buf());
        Ok(())
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let request = self.request(&args);
        debug!(
            "Executing plugin {:?} for tool '{}'",
            self.executable, self.definition.name
        );

        // The child is killed if this future is dropped at a deadline
        let mut child = Command::new(&self.executable)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Failed(format!("Failed to spawn plugin: {}", e)))?;

        let request_json = serde_json::to_string(&request)
            .map_err(|e| ToolError::Protocol(format!("Failed to serialize request: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request_json.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Protocol("Failed to capture plugin stdout".to_string()))?;
        let response = read_response(stdout, &request.id).await;

        if let Err(e) = child.kill().await {
            debug!("Plugin {:?} already exited: {}", self.executable, e);
        }
        response?.into_result()
    }
}

/// Read stdout lines until the response for `request_id` arrives
async fn read_response(
    stdout: tokio::process::ChildStdout,
    request_id: &str,
) -> Result<PluginResponse, ToolError> {
    let mut lines = BufReader::new(stdout).lines();

    while let Some(line) = lines.next_line().await? {
        // Plugins may log to stdout; anything that isn't our response is skipped
        if let Ok(response) = serde_json::from_str::<PluginResponse>(&line) {
            if response.id == request_id {
                return Ok(response);
            }
        }
    }

    Err(ToolError::Protocol(
        "Plugin closed without responding".to_string(),
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn definition(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: "test plugin".to_string(),
            parameters: vec![],
            accepts_extra_params: true,
            requires_model: false,
        }
    }

    fn write_plugin(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("plugin.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_external_tool_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        // Echo back a success response carrying the request id
        let plugin = write_plugin(
            &temp_dir,
            r#"read line
id=$(printf '%s' "$line" | sed 's/.*"id":"\([^"]*\)".*/\1/')
echo "starting up"
printf '{"id":"%s","success":true,"result":{"ok":1}}\n' "$id""#,
        );

        let factory = ExternalToolFactory::new(definition("Plugin_Tool"), plugin);
        let mut tool = factory.create(None).unwrap();
        tool.configure_output(&temp_dir.path().join("out")).unwrap();

        let result = tool.execute(ToolArgs::new()).await.unwrap();
        assert_eq!(result, json!({"ok": 1}));
    }

    #[tokio::test]
    async fn test_external_tool_failure_response() {
        let temp_dir = TempDir::new().unwrap();
        let plugin = write_plugin(
            &temp_dir,
            r#"read line
id=$(printf '%s' "$line" | sed 's/.*"id":"\([^"]*\)".*/\1/')
printf '{"id":"%s","success":false,"error":"no image"}\n' "$id""#,
        );

        let tool = ExternalToolFactory::new(definition("Plugin_Tool"), plugin)
            .create(None)
            .unwrap();
        let result = tool.execute(ToolArgs::new()).await;
        assert!(matches!(result, Err(ToolError::Failed(ref m)) if m == "no image"));
    }

    #[tokio::test]
    async fn test_external_tool_silent_plugin() {
        let temp_dir = TempDir::new().unwrap();
        let plugin = write_plugin(&temp_dir, "read line\nexit 0");

        let tool = ExternalToolFactory::new(definition("Plugin_Tool"), plugin)
            .create(None)
            .unwrap();
        let result = tool.execute(ToolArgs::new()).await;
        assert!(matches!(result, Err(ToolError::Protocol(_))));
    }

    #[test]
    fn test_missing_executable() {
        let factory = ExternalToolFactory::new(
            definition("Gone_Tool"),
            PathBuf::from("/nonexistent/plugin"),
        );
        assert!(factory.create(None).is_err());
    }
}
