use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Keep a local copy of field observations in sync with the server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the client config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the background sync engine until interrupted
    Run,
    /// Fetch and reconcile observations once
    Pull {
        /// Output the pass summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List local observations
    List {
        /// Number of observations to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only show observations with unpushed local edits
        #[arg(long)]
        dirty: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change client configuration and sync preferences
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update configuration values; omitted values are left unchanged
    Set {
        /// Observation server base URL
        #[arg(long, value_name = "URL")]
        server_url: Option<String>,
        /// Bearer token sent with every request
        #[arg(long, value_name = "TOKEN")]
        auth_token: Option<String>,
        /// Event whose observations are synchronized
        #[arg(long, value_name = "ID")]
        event_id: Option<String>,
        /// Seconds between observation fetches
        #[arg(long, value_name = "SECS")]
        poll_interval: Option<u64>,
        /// Enable or disable background fetching
        #[arg(long, value_name = "BOOL")]
        fetch_enabled: Option<bool>,
        /// Seconds between connectivity probes
        #[arg(long, value_name = "SECS")]
        probe_interval: Option<u64>,
    },
}
