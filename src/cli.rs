//! Command-line argument parsing for toolexec

use clap::Parser;
use std::path::PathBuf;

/// toolexec - Run model-generated tool commands
#[derive(Parser, Debug)]
#[command(name = "toolexec")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Tool to run the command with (e.g. Echo_Tool)
    #[arg(short, long, value_name = "NAME", required_unless_present = "list_tools")]
    pub tool: Option<String>,

    /// File holding the model response (reads stdin when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub response: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory tools write their output into
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Per-block time limit in seconds
    #[arg(long, value_name = "SECONDS")]
    pub max_time: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// List available tools and exit
    #[arg(long)]
    pub list_tools: bool,
}
