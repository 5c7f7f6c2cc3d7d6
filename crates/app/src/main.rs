use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use ledgerly::commands::{self, Command, CommandError};
use ledgerly::{AppConfig, Ledger};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ledgerly", version, about = "Personal finance ledger")]
struct Cli {
    /// Configuration file (default: <config dir>/ledgerly.toml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Database file, overriding the configured one.
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = match cli.config {
        Some(path) => path,
        None => AppConfig::default_config_path()?,
    };
    let mut config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }

    // stdout carries JSON only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let ledger = Ledger::open(config).await.context("opening ledger")?;

    match commands::execute(&ledger, cli.command).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            println!("{}", serde_json::to_string(&CommandError::from(e))?);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    run(Cli::parse()).await
}
