use anyhow::{anyhow, Result};
use colored::Colorize;
use std::future::Future;
use std::time::Duration;

use crate::{
    app::{init_config, Config},
    gateway::{
        CodeFragment, Deployer, ExecutionChannel, NornsAgent, RsyncSync, Session, SshTransport,
    },
};

use super::output::{format_outcome, format_report, format_state};
use super::{Cli, Commands, OutputFormat};

/// Wire an SSH-backed agent from configuration
pub fn build_agent(config: &Config) -> NornsAgent {
    let session = Session::new(config.session_config(), Box::new(SshTransport::new()));
    let channel = ExecutionChannel::new(config.safety_filter(), config.remote.repl_command.clone());
    let sync = RsyncSync::new(
        config.sync.program.clone(),
        Some(config.device.password.clone()),
    );
    let deployer = Deployer::new(Box::new(sync), config.deploy_options());
    NornsAgent::new(session, channel, deployer)
}

/// Caller-imposed deadline around a remote call
async fn with_deadline<T>(timeout_secs: Option<u64>, fut: impl Future<Output = T>) -> Result<T> {
    match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .map_err(|_| anyhow!("Timed out after {} seconds waiting for the device", secs)),
        None => Ok(fut.await),
    }
}

/// Handle CLI subcommands. `Ok(false)` means the command ran but did not pass.
pub async fn handle_command(cli: &Cli, config: &Config) -> Result<bool> {
    match &cli.command {
        Commands::Init => {
            let path = init_config()?;
            println!("Configuration at: {}", path.display());
            Ok(true)
        }
        Commands::Check { code } => Ok(check_code(config, &code.join(" "), cli.format)),
        command => {
            let mut agent = build_agent(config);
            with_deadline(cli.timeout, agent.connect()).await??;

            let result = run_remote(&mut agent, command, cli, config).await;
            agent.disconnect().await;
            result
        }
    }
}

async fn run_remote(
    agent: &mut NornsAgent,
    command: &Commands,
    cli: &Cli,
    config: &Config,
) -> Result<bool> {
    match command {
        Commands::Eval { code } => {
            let fragment = CodeFragment::new(code.join(" "));
            let result = with_deadline(cli.timeout, agent.eval(&fragment)).await??;
            println!("{}", result);
            Ok(true)
        }
        Commands::State => {
            let state = with_deadline(cli.timeout, agent.get_state()).await?;
            println!("{}", format_state(&state, cli.format));
            Ok(true)
        }
        Commands::Test { test_file } => {
            let outcome = with_deadline(cli.timeout, agent.run_test(test_file)).await??;
            println!("{}", format_outcome(&outcome, cli.format));
            Ok(outcome.success && !outcome.error)
        }
        Commands::Deploy {
            local_path,
            remote_path,
        } => {
            let remote_path = remote_path
                .as_deref()
                .unwrap_or(&config.remote.deploy_path);
            let report = with_deadline(
                cli.timeout,
                agent.deploy_and_test(local_path, remote_path),
            )
            .await?;
            println!("{}", format_report(&report, cli.format));
            Ok(report.is_success() && report.all_passed)
        }
        Commands::Check { .. } | Commands::Init => {
            unreachable!("local commands are handled before connecting")
        }
    }
}

/// Run only the safety filter; true when the code would be sent
pub fn check_code(config: &Config, code: &str, format: OutputFormat) -> bool {
    let filter = config.safety_filter();
    let pattern = filter.first_match(code);

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "unsafe": pattern.is_some(),
                "pattern": pattern,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            );
        }
        OutputFormat::Text => match pattern {
            Some(p) => println!("{} matched forbidden pattern `{}`", "[REJECTED]".red(), p),
            None => println!("{} no forbidden patterns", "[OK]".green()),
        },
    }

    pattern.is_none()
}
