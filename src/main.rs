//! toolexec - Execute model-generated tool commands
//!
//! This is the main entry point for the toolexec binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use tracing::{error, info, warn};

mod cli;
mod config;
mod error;
mod executor;
mod logging;
mod response;
mod runner;
mod script;
mod splitter;
mod tools;

use cli::Args;
use config::Config;
use executor::Executor;
use response::extract_explanation_and_command;
use tools::ToolRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let mut config = match Config::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            Config::default()
        }
    };
    if let Some(max_time) = args.max_time {
        config.executor.max_time = max_time;
    }

    // Initialize logging
    init_logging(args.debug || config.executor.verbose);

    info!("Starting toolexec v{}", env!("CARGO_PKG_VERSION"));
    config.validate().context("Invalid configuration")?;

    let mut registry = ToolRegistry::with_builtins();
    match registry.load_plugins(&config.plugins) {
        Ok(count) if count > 0 => info!("Loaded {} plugin(s)", count),
        Ok(_) => {}
        Err(e) => warn!("Failed to load plugins: {}", e),
    }

    if args.list_tools {
        for name in registry.tool_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let tool_name = args
        .tool
        .as_deref()
        .context("--tool is required unless --list-tools is given")?;

    let raw = read_response(&args)?;
    let parsed = extract_explanation_and_command(raw);
    info!("Analysis: {}", parsed.analysis);
    info!("Explanation: {}", parsed.explanation);

    let max_output_length = config.executor.max_output_length;
    let mut executor = Executor::new(config, registry);
    let query_dir = executor
        .set_query_cache_dir(args.cache_dir.clone())
        .context("Failed to create query cache directory")?;
    info!("Query cache directory: {:?}", query_dir);

    let output = executor
        .run_tool_command(tool_name, &parsed.command)
        .await
        .truncated(max_output_length);

    println!("{}", serde_json::to_string_pretty(&output)?);

    if output.is_error() {
        error!("Command for '{}' did not run", tool_name);
        std::process::exit(1);
    }

    Ok(())
}

/// Read the model response from the given file or stdin
fn read_response(args: &Args) -> Result<String> {
    match &args.response {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read response from {}", path.display())),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read response from stdin")?;
            Ok(buffer)
        }
    }
}

/// Initialize the logging/tracing subsystem
fn init_logging(debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
