use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use scout_core::remote::ServerClient;
use scout_core::services::DatabaseService;
use scout_core::state::SyncStatus;
use scout_core::sync::{
    LivePreferences, ProbeConnectivity, Reconciler, RemoteUserDirectory, SyncEngine,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::commands::common::{format_sync_timestamp, load_client_config, open_database};
use crate::error::CliError;

/// How often the settings table is re-read for changes made by `scout config set`.
const SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Run the background sync engine until Ctrl-C.
pub async fn run_engine(config_path: &Path, db_path: &Path) -> Result<(), CliError> {
    let config = load_client_config(config_path)?;
    let server = config.server_config()?;
    let client = ServerClient::new(&server)?;
    let probe = ProbeConnectivity::for_server_url(&server.server_url)?;
    let db = open_database(db_path).await?;

    let settings = match db.load_settings().await {
        Ok(settings) => settings,
        Err(error) => {
            db.close().await;
            return Err(error.into());
        }
    };
    let preferences = Arc::new(LivePreferences::new(settings));

    let cancel = CancellationToken::new();
    let probe_task = probe.spawn(config.connectivity_probe_interval(), cancel.child_token());
    let settings_task = spawn_settings_watcher(
        db.clone(),
        Arc::clone(&preferences),
        cancel.child_token(),
    );

    let reconciler = Reconciler::new(
        Arc::new(db.clone()),
        Arc::new(RemoteUserDirectory::new(db.clone(), client.clone())),
        Arc::new(client),
    );
    let engine = SyncEngine::new(reconciler, preferences, Arc::new(probe.clone()))
        .with_cancellation(cancel.child_token());
    let handle = engine.spawn();
    let status = handle.status();

    println!(
        "Syncing event {} from {} (probing {}). Press Ctrl-C to stop.",
        server.event_id,
        server.server_url,
        probe.address()
    );

    let signal = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down sync engine");
    handle.shutdown();
    cancel.cancel();
    handle.join().await;
    for task in [probe_task, settings_task] {
        if let Err(error) = task.await {
            tracing::error!("Background task failed: {error}");
        }
    }
    db.close().await;

    println!("{}", format_final_status(&status.borrow()));
    signal?;
    Ok(())
}

fn spawn_settings_watcher(
    db: DatabaseService,
    preferences: Arc<LivePreferences>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SETTINGS_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match db.load_settings().await {
                Ok(settings) => {
                    let changed = preferences.replace(settings);
                    if !changed.is_empty() {
                        tracing::info!("Sync preferences changed: {changed:?}");
                    }
                }
                Err(error) => tracing::warn!("Failed to reload sync preferences: {error}"),
            }
        }
    })
}

pub fn format_final_status(status: &SyncStatus) -> String {
    let last_sync = status
        .last_synced_at
        .map_or_else(|| "never".to_string(), format_sync_timestamp);
    let mut line = format!(
        "Stopped after {} pass(es); last state {}, last successful sync {last_sync}",
        status.passes, status.state
    );
    if let Some(error) = &status.last_error {
        line.push_str(&format!(" (last error: {error})"));
    }
    line
}
