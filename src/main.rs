use anyhow::Result;
use clap::Parser;

use norns_agent::{
    app::{load_config, load_config_from},
    cli::{handle_command, Cli},
    utils::init_logger,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments; clap exits with usage on malformed input
    let cli = Cli::parse();

    init_logger(cli.verbose);

    // Load configuration
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    if !handle_command(&cli, &config).await? {
        std::process::exit(1);
    }

    Ok(())
}
