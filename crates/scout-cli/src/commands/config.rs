use std::path::Path;

use scout_core::config::ClientConfig;
use scout_core::models::{SyncSettings, MIN_POLL_INTERVAL_SECS};
use scout_core::util::{is_http_url, normalize_text_option};
use serde::Serialize;

use crate::commands::common::{load_client_config, open_database};
use crate::error::CliError;

/// Values passed to `scout config set`; `None` leaves a value unchanged.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub server_url: Option<String>,
    pub auth_token: Option<String>,
    pub event_id: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub fetch_enabled: Option<bool>,
    pub probe_interval_secs: Option<u64>,
}

impl ConfigUpdate {
    pub const fn touches_client_config(&self) -> bool {
        self.server_url.is_some()
            || self.auth_token.is_some()
            || self.event_id.is_some()
            || self.probe_interval_secs.is_some()
    }

    pub const fn touches_settings(&self) -> bool {
        self.poll_interval_secs.is_some() || self.fetch_enabled.is_some()
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub config_path: String,
    pub db_path: String,
    pub server_url: Option<String>,
    pub event_id: Option<String>,
    pub auth_token_set: bool,
    pub connectivity_probe_secs: u64,
    pub poll_interval_secs: u64,
    pub fetch_enabled: bool,
}

pub async fn run_config_show(
    as_json: bool,
    config_path: &Path,
    db_path: &Path,
) -> Result<(), CliError> {
    let config = load_client_config(config_path)?;
    let db = open_database(db_path).await?;
    let settings = db.load_settings().await;
    db.close().await;

    let view = config_view(&config, settings?, config_path, db_path);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        for line in format_config_lines(&view) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_config_set(
    update: ConfigUpdate,
    config_path: &Path,
    db_path: &Path,
) -> Result<(), CliError> {
    if !update.touches_client_config() && !update.touches_settings() {
        return Err(CliError::NothingToSet);
    }

    if update.touches_client_config() {
        // Write the file without env overrides so they are not persisted.
        let mut config = ClientConfig::load_from_path(config_path)?;
        apply_client_update(&mut config, &update)?;
        config.save_to_path(config_path)?;
        println!("Updated {}", config_path.display());
    }

    if update.touches_settings() {
        let db = open_database(db_path).await?;
        let saved = match db.load_settings().await {
            Ok(current) => match apply_settings_update(current, &update) {
                Ok(next) => db.save_settings(&next).await.map_err(CliError::from),
                Err(error) => Err(error),
            },
            Err(error) => Err(error.into()),
        };
        db.close().await;
        saved?;
        println!("Updated sync preferences in {}", db_path.display());
    }

    Ok(())
}

pub fn apply_client_update(
    config: &mut ClientConfig,
    update: &ConfigUpdate,
) -> Result<(), CliError> {
    if let Some(server_url) = &update.server_url {
        let server_url = normalize_text_option(Some(server_url.clone()));
        if let Some(url) = &server_url {
            if !is_http_url(url) {
                return Err(CliError::Config(
                    "server url must include http:// or https://".to_string(),
                ));
            }
        }
        config.server_url = server_url;
    }
    if let Some(auth_token) = &update.auth_token {
        config.auth_token = normalize_text_option(Some(auth_token.clone()));
    }
    if let Some(event_id) = &update.event_id {
        config.event_id = normalize_text_option(Some(event_id.clone()));
    }
    if let Some(secs) = update.probe_interval_secs {
        if secs == 0 {
            return Err(CliError::Config(
                "probe interval must be at least 1 second".to_string(),
            ));
        }
        config.connectivity_probe_secs = secs;
    }
    Ok(())
}

pub fn apply_settings_update(
    mut settings: SyncSettings,
    update: &ConfigUpdate,
) -> Result<SyncSettings, CliError> {
    if let Some(secs) = update.poll_interval_secs {
        if secs < MIN_POLL_INTERVAL_SECS {
            return Err(CliError::Config(format!(
                "poll interval must be at least {MIN_POLL_INTERVAL_SECS} second(s)"
            )));
        }
        settings.poll_interval_secs = secs;
    }
    if let Some(enabled) = update.fetch_enabled {
        settings.fetch_enabled = enabled;
    }
    Ok(settings)
}

pub fn config_view(
    config: &ClientConfig,
    settings: SyncSettings,
    config_path: &Path,
    db_path: &Path,
) -> ConfigView {
    ConfigView {
        config_path: config_path.display().to_string(),
        db_path: db_path.display().to_string(),
        server_url: config.server_url.clone(),
        event_id: config.event_id.clone(),
        auth_token_set: config.auth_token.is_some(),
        connectivity_probe_secs: config.connectivity_probe_secs,
        poll_interval_secs: settings.poll_interval_secs,
        fetch_enabled: settings.fetch_enabled,
    }
}

pub fn format_config_lines(view: &ConfigView) -> Vec<String> {
    vec![
        format!("config file:      {}", view.config_path),
        format!("database:         {}", view.db_path),
        format!(
            "server url:       {}",
            view.server_url.as_deref().unwrap_or("(not set)")
        ),
        format!(
            "event id:         {}",
            view.event_id.as_deref().unwrap_or("(not set)")
        ),
        format!(
            "auth token:       {}",
            if view.auth_token_set { "(set)" } else { "(not set)" }
        ),
        format!("probe interval:   {}s", view.connectivity_probe_secs),
        format!("poll interval:    {}s", view.poll_interval_secs),
        format!(
            "fetch enabled:    {}",
            if view.fetch_enabled { "yes" } else { "no" }
        ),
    ]
}
