/// CLI argument parsing and command handling - Gateway
mod args;
mod commands;
mod output;

pub use args::{Cli, Commands, OutputFormat};
pub use commands::{build_agent, check_code, handle_command};
pub use output::{format_outcome, format_report, format_state};
