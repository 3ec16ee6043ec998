mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ConfigCommands};
use crate::commands::common::{resolve_config_path, resolve_db_path};
use crate::commands::completions::run_completions;
use crate::commands::config::{run_config_set, run_config_show, ConfigUpdate};
use crate::commands::list::run_list;
use crate::commands::pull::run_pull;
use crate::commands::run::run_engine;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scout=info")),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let config_path = resolve_config_path(cli.config);

    match cli.command {
        Commands::Run => run_engine(&config_path, &db_path).await?,
        Commands::Pull { json } => run_pull(json, &config_path, &db_path).await?,
        Commands::List { limit, dirty, json } => run_list(limit, dirty, json, &db_path).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Show { json } => {
                run_config_show(json, &config_path, &db_path).await?;
            }
            ConfigCommands::Set {
                server_url,
                auth_token,
                event_id,
                poll_interval,
                fetch_enabled,
                probe_interval,
            } => {
                let update = ConfigUpdate {
                    server_url,
                    auth_token,
                    event_id,
                    poll_interval_secs: poll_interval,
                    fetch_enabled,
                    probe_interval_secs: probe_interval,
                };
                run_config_set(update, &config_path, &db_path).await?;
            }
        },
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
