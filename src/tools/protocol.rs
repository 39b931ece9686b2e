//! Tool protocol definitions
//!
//! Declared tool metadata, keyword arguments, and the JSON request/response
//! format used to talk to external plugin executables.

use crate::error::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Tool metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (e.g., "Text_Writer_Tool")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Parameter definitions
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    /// Accept keyword arguments that are not declared
    #[serde(default)]
    pub accepts_extra_params: bool,
    /// Whether construction needs a model identifier
    #[serde(default)]
    pub requires_model: bool,
}

/// Parameter definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name
    pub name: String,
    /// Parameter type (string, number, boolean, array, object)
    #[serde(rename = "type")]
    pub param_type: String,
    /// Description
    pub description: String,
    /// Whether parameter is required
    #[serde(default)]
    pub required: bool,
    /// Default value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterDef {
    pub fn required(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: param_type.to_string(),
            description: description.to_string(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &str, param_type: &str, description: &str, default: Value) -> Self {
        Self {
            name: name.to_string(),
            param_type: param_type.to_string(),
            description: description.to_string(),
            required: false,
            default: Some(default),
        }
    }
}

impl ToolDefinition {
    /// Check keyword arguments against the declared parameters
    pub fn validate_args(&self, args: &ToolArgs) -> Result<(), ToolError> {
        if !self.accepts_extra_params {
            if let Some(param) = args
                .keys()
                .find(|key| !self.parameters.iter().any(|p| p.name == *key))
            {
                return Err(ToolError::UnknownParameter {
                    tool: self.name.clone(),
                    param: param.to_string(),
                });
            }
        }

        if let Some(missing) = self
            .parameters
            .iter()
            .find(|p| p.required && args.get(&p.name).is_none())
        {
            return Err(ToolError::MissingParameter(missing.name.clone()));
        }

        Ok(())
    }
}

/// Keyword arguments of one invocation, in call order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    entries: Vec<(String, Value)>,
}

impl ToolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an argument
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Get a string argument
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_str())
    }

    /// Get a required string argument
    pub fn require_str(&self, name: &str) -> Result<&str, ToolError> {
        match self.get(name) {
            None => Err(ToolError::MissingParameter(name.to_string())),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(invalid_type(name, "a string", other)),
        }
    }

    /// Get a required numeric argument
    pub fn require_f64(&self, name: &str) -> Result<f64, ToolError> {
        match self.get(name) {
            None => Err(ToolError::MissingParameter(name.to_string())),
            Some(v) => v.as_f64().ok_or_else(|| invalid_type(name, "a number", v)),
        }
    }

    /// Get a boolean argument with default
    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        self.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Arguments as a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.to_map())
    }

    fn to_map(&self) -> Map<String, Value> {
        self.entries.iter().cloned().collect()
    }

    /// Arguments as the parameter map of a plugin request
    pub fn to_params(&self) -> HashMap<String, Value> {
        self.entries.iter().cloned().collect()
    }
}

impl FromIterator<(String, Value)> for ToolArgs {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut args = ToolArgs::new();
        for (name, value) in iter {
            args.insert(name, value);
        }
        args
    }
}

fn invalid_type(name: &str, expected: &str, got: &Value) -> ToolError {
    ToolError::InvalidArgument {
        param: name.to_string(),
        reason: format!("expected {}, got {}", expected, got),
    }
}

/// Request sent to a plugin executable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRequest {
    /// Request ID for correlation
    pub id: String,
    /// Tool name to invoke
    pub tool: String,
    /// Keyword arguments passed to the tool
    pub params: HashMap<String, Value>,
    /// Output directory configured for this tool instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Model identifier, for tools that need one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Response from a plugin executable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResponse {
    /// Request ID this responds to
    pub id: String,
    /// Whether the operation succeeded
    pub success: bool,
    /// Result data (if success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message (if failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginRequest {
    /// Create a new request
    pub fn new(tool: &str, args: &ToolArgs) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool: tool.to_string(),
            params: args.to_params(),
            output_dir: None,
            model: None,
        }
    }
}

impl PluginResponse {
    /// Turn the response into the tool's return value
    pub fn into_result(self) -> Result<Value, ToolError> {
        if self.success {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(ToolError::Failed(
                self.error
                    .unwrap_or_else(|| "plugin reported failure without a message".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition() -> ToolDefinition {
        ToolDefinition {
            name: "Text_Writer_Tool".to_string(),
            description: "Write text".to_string(),
            parameters: vec![
                ParameterDef::required("filename", "string", "File name"),
                ParameterDef::optional("append", "boolean", "Append", json!(false)),
            ],
            accepts_extra_params: false,
            requires_model: false,
        }
    }

    fn args(pairs: &[(&str, Value)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_validate_accepts_declared_params() {
        let def = definition();
        assert!(def.validate_args(&args(&[("filename", json!("a.txt"))])).is_ok());
        assert!(def
            .validate_args(&args(&[("filename", json!("a.txt")), ("append", json!(true))]))
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_param() {
        let err = definition()
            .validate_args(&args(&[("filename", json!("a")), ("path", json!("b"))]))
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownParameter { ref param, .. } if param == "path"));
    }

    #[test]
    fn test_validate_rejects_missing_required() {
        let err = definition().validate_args(&ToolArgs::new()).unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter(ref p) if p == "filename"));
    }

    #[test]
    fn test_validate_extra_params_allowed() {
        let mut def = definition();
        def.accepts_extra_params = true;
        assert!(def
            .validate_args(&args(&[("filename", json!("a")), ("anything", json!(1))]))
            .is_ok());
    }

    #[test]
    fn test_args_insert_replaces() {
        let mut a = ToolArgs::new();
        a.insert("x", json!(1));
        a.insert("y", json!(2));
        a.insert("x", json!(3));
        assert_eq!(a.get("x"), Some(&json!(3)));
        assert_eq!(a.keys().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn test_args_typed_getters() {
        let a = args(&[
            ("name", json!("n")),
            ("n", json!(2)),
            ("flag", json!(true)),
            ("items", json!([1, 2])),
        ]);
        assert_eq!(a.require_str("name").unwrap(), "n");
        assert!(matches!(
            a.require_str("n"),
            Err(ToolError::InvalidArgument { .. })
        ));
        assert!(matches!(
            a.require_str("missing"),
            Err(ToolError::MissingParameter(_))
        ));
        assert_eq!(a.require_f64("n").unwrap(), 2.0);
        assert!(a.get_bool("flag", false));
        assert!(!a.get_bool("missing", false));
        assert_eq!(a.to_json(), json!({"name": "n", "n": 2, "flag": true, "items": [1, 2]}));
    }

    #[test]
    fn test_plugin_request_new() {
        let req = PluginRequest::new("Echo_Tool", &args(&[("path", json!("/tmp/test"))]));

        assert_eq!(req.tool, "Echo_Tool");
        assert_eq!(req.params.get("path"), Some(&json!("/tmp/test")));
        assert_eq!(req.id.len(), 36);
    }

    #[test]
    fn test_plugin_response_into_result() {
        let ok: PluginResponse =
            serde_json::from_str(r#"{"id": "1", "success": true, "result": {"n": 1}}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), json!({"n": 1}));

        let failed: PluginResponse =
            serde_json::from_str(r#"{"id": "2", "success": false, "error": "boom"}"#).unwrap();
        assert!(matches!(failed.into_result(), Err(ToolError::Failed(ref m)) if m == "boom"));
    }

    #[test]
    fn test_tool_definition_serialization() {
        let json = serde_json::to_string(&definition()).unwrap();
        assert!(json.contains("Text_Writer_Tool"));
        assert!(json.contains("\"type\":\"string\""));

        let parsed: ToolDefinition =
            serde_json::from_str(r#"{"name": "X_Tool", "description": "d"}"#).unwrap();
        assert!(parsed.parameters.is_empty());
        assert!(!parsed.accepts_extra_params);
    }
}
