use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "norns-agent")]
#[command(version)]
#[command(
    about = "Evaluate Lua, read state, run tests and deploy on a norns device over SSH",
    long_about = None
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format for structured results
    #[arg(long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    pub format: OutputFormat,

    /// Give up on the device after this many seconds (no deadline by default)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute Lua code in the device REPL
    Eval {
        /// Lua source; multiple words are joined with spaces
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        code: Vec<String>,
    },
    /// Get device state
    State,
    /// Run a test file on the device
    Test {
        /// Local Lua test file
        test_file: PathBuf,
    },
    /// Sync a local tree to the device, then run its tests
    Deploy {
        /// Local project directory
        local_path: PathBuf,
        /// Remote destination (defaults to remote.deploy_path from config)
        #[arg(long)]
        remote_path: Option<String>,
    },
    /// Check Lua code against the safety filter without connecting
    Check {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        code: Vec<String>,
    },
    /// Initialize configuration
    Init,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Short human-readable summary
    Text,
}
