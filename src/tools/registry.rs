//! Tool registry
//!
//! Maps tool names to factories. Built-in tools are registered in code;
//! plugins are discovered from the plugin directory.

use super::builtin::BuiltinTools;
use super::external::ExternalToolFactory;
use super::protocol::ToolDefinition;
use super::ToolFactory;
use crate::config::PluginConfig;
use crate::error::ResolutionError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Derive the lookup key for a tool name.
///
/// Lookup is case-insensitive and ignores one trailing `_tool`, so
/// `Object_Detector_Tool`, `object_detector_tool` and `OBJECT_DETECTOR`
/// all resolve to `object_detector`.
pub fn registry_key(name: &str) -> String {
    let key = name.trim().to_lowercase();
    if let Some(stem) = key.strip_suffix("_tool") {
        if !stem.is_empty() {
            return stem.to_string();
        }
    }
    key
}

/// Registry of tool factories
#[derive(Default)]
pub struct ToolRegistry {
    factories: HashMap<String, Box<dyn ToolFactory>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in tools
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for factory in BuiltinTools::factories() {
            registry.register(factory);
        }
        registry
    }

    /// Register a factory, replacing any previous entry with the same key
    pub fn register(&mut self, factory: Box<dyn ToolFactory>) {
        let key = registry_key(factory.name());
        if let Some(previous) = self.factories.insert(key.clone(), factory) {
            warn!(
                "Tool '{}' replaced an existing registration under '{}'",
                previous.name(),
                key
            );
        }
    }

    /// Look up the factory for a tool name
    pub fn resolve(&self, name: &str) -> Result<&dyn ToolFactory, ResolutionError> {
        let key = registry_key(name);
        self.factories
            .get(&key)
            .map(|f| f.as_ref())
            .ok_or_else(|| ResolutionError::NotFound {
                name: name.to_string(),
                key,
            })
    }

    /// Canonical names of all registered tools, sorted
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.values().map(|f| f.name()).collect();
        names.sort_unstable();
        names
    }

    /// Discover and load plugins
    pub fn load_plugins(&mut self, config: &PluginConfig) -> Result<usize, String> {
        if !config.enabled {
            debug!("Plugins disabled in configuration");
            return Ok(0);
        }

        let plugin_dir = &config.directory;
        if !plugin_dir.exists() {
            debug!("Plugin directory does not exist: {:?}", plugin_dir);
            return Ok(0);
        }

        // If specific plugins are configured, load only those
        if !config.load.is_empty() {
            let mut loaded = 0;
            for name in &config.load {
                match self.load_plugin(plugin_dir, name) {
                    Ok(()) => loaded += 1,
                    Err(e) => warn!("Failed to load plugin '{}': {}", name, e),
                }
            }
            return Ok(loaded);
        }

        if config.auto_load {
            return self.auto_load_plugins(plugin_dir);
        }

        Ok(0)
    }

    /// Load a specific plugin by name
    fn load_plugin(&mut self, plugin_dir: &Path, name: &str) -> Result<(), String> {
        let plugin_path = plugin_dir.join(name);
        let exec_path = find_executable(&plugin_path, name)?;

        if !is_executable(&exec_path) {
            return Err(format!("Plugin is not executable: {:?}", exec_path));
        }

        let tools = load_tool_definitions(&plugin_path)?;
        if tools.is_empty() {
            return Err(format!("Plugin '{}' declares no tools", name));
        }

        info!("Loaded plugin '{}' with {} tools", name, tools.len());
        for tool in tools {
            self.register(Box::new(ExternalToolFactory::new(tool, exec_path.clone())));
        }

        Ok(())
    }

    /// Auto-load all plugins from directory
    fn auto_load_plugins(&mut self, plugin_dir: &Path) -> Result<usize, String> {
        let entries = fs::read_dir(plugin_dir)
            .map_err(|e| format!("Failed to read plugin directory: {}", e))?;

        let mut loaded = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            // Skip hidden files and manifests
            if name.is_empty() || name.starts_with('.') {
                continue;
            }
            if name.ends_with(".json") || name.ends_with(".toml") {
                continue;
            }

            match self.load_plugin(plugin_dir, &name) {
                Ok(()) => loaded += 1,
                Err(e) => debug!("Skipping '{}': {}", name, e),
            }
        }

        Ok(loaded)
    }
}

/// A plugin is either an executable file or a directory holding `main`
/// or an executable named after the plugin
fn find_executable(plugin_path: &Path, name: &str) -> Result<PathBuf, String> {
    if plugin_path.is_file() {
        return Ok(plugin_path.to_path_buf());
    }
    if !plugin_path.is_dir() {
        return Err(format!("Plugin not found: {}", name));
    }

    [plugin_path.join("main"), plugin_path.join(name)]
        .into_iter()
        .find(|candidate| candidate.exists())
        .ok_or_else(|| format!("No executable found in plugin directory: {:?}", plugin_path))
}

/// Plugin manifest format
#[derive(Debug, serde::Deserialize)]
struct PluginManifest {
    #[allow(dead_code)]
    name: String,
    #[allow(dead_code)]
    version: Option<String>,
    tools: Vec<ToolDefinition>,
}

/// Load tool definitions from the plugin manifest
fn load_tool_definitions(plugin_path: &Path) -> Result<Vec<ToolDefinition>, String> {
    let manifest_path = if plugin_path.is_dir() {
        plugin_path.join("manifest.json")
    } else {
        plugin_path.with_extension("json")
    };

    if !manifest_path.exists() {
        return Ok(vec![]);
    }

    let content = fs::read_to_string(&manifest_path)
        .map_err(|e| format!("Failed to read manifest: {}", e))?;
    let manifest: PluginManifest =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse manifest: {}", e))?;

    Ok(manifest.tools)
}

/// Check if a file is executable
#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.exists()
}
