//! Configuration management for toolexec
//!
//! Handles loading and merging configuration from multiple sources:
//! 1. Compiled defaults
//! 2. System config (/etc/toolexec/config.toml)
//! 3. User config (~/.toolexec/config.toml)
//! 4. CLI-specified config file
//! 5. Environment variables

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub executor: ExecutorConfig,
    pub plugins: PluginConfig,
    pub logging: LoggingConfig,
}

/// Tool command execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Model identifier handed to tools that need one
    pub llm_engine: String,
    /// Root directory for per-query cache directories
    pub root_cache_dir: PathBuf,
    /// Per-block deadline in seconds
    pub max_time: u64,
    /// Maximum characters of a result shown downstream
    pub max_output_length: usize,
    /// Verbose diagnostics
    pub verbose: bool,
}

/// External plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Enable plugins
    pub enabled: bool,
    /// Plugin directory
    pub directory: PathBuf,
    /// Auto-load plugins
    pub auto_load: bool,
    /// Specific plugins to load
    pub load: Vec<String>,
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write one JSON line per executed command into the query cache dir
    pub audit: bool,
    /// Audit file name inside the query cache dir
    pub audit_file: String,
    /// Redact secrets from logged commands
    pub redact_secrets: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            llm_engine: "gpt-4o".to_string(),
            root_cache_dir: PathBuf::from("solver_cache"),
            max_time: 120,
            max_output_length: 100_000,
            verbose: false,
        }
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            enabled: true,
            directory: home.join(".toolexec/plugins"),
            auto_load: true,
            load: vec![],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            audit: true,
            audit_file: "execution_log.jsonl".to_string(),
            redact_secrets: true,
        }
    }
}

/// One config file as written: only the keys it actually sets
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    executor: ExecutorLayer,
    plugins: PluginLayer,
    logging: LoggingLayer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExecutorLayer {
    llm_engine: Option<String>,
    root_cache_dir: Option<PathBuf>,
    max_time: Option<u64>,
    max_output_length: Option<usize>,
    verbose: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PluginLayer {
    enabled: Option<bool>,
    directory: Option<PathBuf>,
    auto_load: Option<bool>,
    load: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoggingLayer {
    audit: Option<bool>,
    audit_file: Option<String>,
    redact_secrets: Option<bool>,
}

impl Config {
    /// Load configuration from all sources
    pub fn load(cli_config: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let system_config = Path::new("/etc/toolexec/config.toml");
        if system_config.exists() {
            debug!("Loading system config from {:?}", system_config);
            config.merge_from_file(system_config)?;
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".toolexec/config.toml");
            if user_config.exists() {
                debug!("Loading user config from {:?}", user_config);
                config.merge_from_file(&user_config)?;
            }
        }

        if let Some(path) = cli_config {
            debug!("Loading CLI config from {:?}", path);
            config.merge_from_file(path)?;
        }

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Merge configuration from a file
    fn merge_from_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;

        let layer: ConfigLayer = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

        self.merge(layer);
        Ok(())
    }

    /// Merge a file layer into this config; keys the layer sets take precedence
    fn merge(&mut self, layer: ConfigLayer) {
        let ConfigLayer {
            executor,
            plugins,
            logging,
        } = layer;

        // Executor config
        if let Some(llm_engine) = executor.llm_engine {
            self.executor.llm_engine = llm_engine;
        }
        if let Some(root_cache_dir) = executor.root_cache_dir {
            self.executor.root_cache_dir = root_cache_dir;
        }
        if let Some(max_time) = executor.max_time {
            self.executor.max_time = max_time;
        }
        if let Some(max_output_length) = executor.max_output_length {
            self.executor.max_output_length = max_output_length;
        }
        if let Some(verbose) = executor.verbose {
            self.executor.verbose = verbose;
        }

        // Plugin config
        if let Some(enabled) = plugins.enabled {
            self.plugins.enabled = enabled;
        }
        if let Some(directory) = plugins.directory {
            self.plugins.directory = directory;
        }
        if let Some(auto_load) = plugins.auto_load {
            self.plugins.auto_load = auto_load;
        }
        if let Some(load) = plugins.load {
            self.plugins.load = load;
        }

        // Logging config
        if let Some(audit) = logging.audit {
            self.logging.audit = audit;
        }
        if let Some(audit_file) = logging.audit_file {
            self.logging.audit_file = audit_file;
        }
        if let Some(redact_secrets) = logging.redact_secrets {
            self.logging.redact_secrets = redact_secrets;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(engine) = std::env::var("TOOLEXEC_LLM_ENGINE") {
            self.executor.llm_engine = engine;
        }
        if let Ok(max_time) = std::env::var("TOOLEXEC_MAX_TIME") {
            self.executor.max_time = max_time.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("TOOLEXEC_MAX_TIME is not an integer: {}", max_time))
            })?;
        }
        if let Ok(dir) = std::env::var("TOOLEXEC_CACHE_DIR") {
            self.executor.root_cache_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.llm_engine.trim().is_empty() {
            return Err(ConfigError::MissingField("executor.llm_engine".to_string()));
        }
        if self.executor.max_time == 0 {
            return Err(ConfigError::Invalid(
                "executor.max_time must be at least 1 second".to_string(),
            ));
        }
        if self.logging.audit && self.logging.audit_file.trim().is_empty() {
            return Err(ConfigError::MissingField("logging.audit_file".to_string()));
        }
        Ok(())
    }
}
