use std::path::Path;
use std::sync::Arc;

use scout_core::remote::ServerClient;
use scout_core::sync::{PassSummary, Reconciler, RemoteUserDirectory};

use crate::commands::common::{load_client_config, open_database};
use crate::error::CliError;

/// Run a single fetch-and-reconcile pass against the configured server.
pub async fn run_pull(as_json: bool, config_path: &Path, db_path: &Path) -> Result<(), CliError> {
    let config = load_client_config(config_path)?;
    let client = ServerClient::new(&config.server_config()?)?;
    let db = open_database(db_path).await?;

    let reconciler = Reconciler::new(
        Arc::new(db.clone()),
        Arc::new(RemoteUserDirectory::new(db.clone(), client.clone())),
        Arc::new(client),
    );
    let result = reconciler.run_pass().await;
    db.close().await;
    let summary = result?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in format_pass_summary(&summary) {
            println!("{line}");
        }
    }

    Ok(())
}

pub fn format_pass_summary(summary: &PassSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Fetched {} observation(s): {} created, {} updated, {} deleted, {} unchanged",
        summary.fetched, summary.created, summary.updated, summary.deleted, summary.unchanged
    )];
    if summary.skipped_dirty > 0 {
        lines.push(format!(
            "Kept {} locally edited observation(s) untouched",
            summary.skipped_dirty
        ));
    }
    if summary.malformed > 0 || summary.failed > 0 {
        lines.push(format!(
            "Skipped {} malformed record(s), {} failed write(s)",
            summary.malformed, summary.failed
        ));
    }
    lines
}
