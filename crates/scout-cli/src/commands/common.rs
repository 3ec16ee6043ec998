use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use scout_core::config::{ClientConfig, CONFIG_FILE_NAME};
use scout_core::models::Geometry;
use scout_core::services::DatabaseService;
use scout_core::util::compact_text;
use scout_core::Observation;
use serde::Serialize;

use crate::error::CliError;

const APP_DIR: &str = "scout";
const DB_PATH_ENV: &str = "SCOUT_DB_PATH";

#[derive(Debug, Serialize)]
pub struct ObservationListItem {
    pub id: String,
    pub remote_id: Option<String>,
    pub state: String,
    pub dirty: bool,
    pub user_id: Option<String>,
    pub last_modified: i64,
    pub timestamp: i64,
    pub relative_time: String,
    pub location: String,
    pub properties: std::collections::BTreeMap<String, String>,
    pub attachments: usize,
}

pub fn observation_to_list_item(observation: &Observation) -> ObservationListItem {
    let now_ms = Utc::now().timestamp_millis();
    ObservationListItem {
        id: observation.id.to_string(),
        remote_id: observation.remote_id.clone(),
        state: observation.state.to_string(),
        dirty: observation.dirty,
        user_id: observation.user_id.clone(),
        last_modified: observation.last_modified,
        timestamp: observation.timestamp,
        relative_time: format_relative_time(observation.timestamp, now_ms),
        location: format_geometry(&observation.geometry),
        properties: observation.properties.clone(),
        attachments: observation.attachments.len(),
    }
}

pub fn format_observation_lines(observations: &[Observation]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    observations
        .iter()
        .map(|observation| format_observation_line(observation, now_ms))
        .collect()
}

pub fn format_observation_line(observation: &Observation, now_ms: i64) -> String {
    let id = observation.id.to_string();
    let short_id = id.chars().take(13).collect::<String>();
    let remote = observation.remote_id.as_deref().unwrap_or("-");
    let marker = if observation.dirty { "*" } else { " " };
    let summary = observation_summary(observation, 32);
    let relative_time = format_relative_time(observation.timestamp, now_ms);

    format!(
        "{short_id:<13} {marker} {remote:<24}  {:<8}  {summary:<32}  {relative_time}",
        observation.state.as_str()
    )
}

/// Short text for an observation: its `type` property when present,
/// otherwise the first property value, otherwise the location.
pub fn observation_summary(observation: &Observation, max_chars: usize) -> String {
    let text = observation
        .property("type")
        .map(str::to_string)
        .or_else(|| observation.properties.values().next().cloned())
        .unwrap_or_else(|| format_geometry(&observation.geometry));
    let compact = compact_text(&text);

    if compact.chars().count() > max_chars {
        let truncated = compact
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        format!("{truncated}...")
    } else {
        compact
    }
}

pub fn format_geometry(geometry: &Geometry) -> String {
    match geometry {
        Geometry::Point(position) => match position.as_slice() {
            [longitude, latitude, ..] => format!("{latitude:.5}, {longitude:.5}"),
            _ => "point".to_string(),
        },
        Geometry::LineString(positions) => format!("line ({} points)", positions.len()),
        Geometry::Polygon(rings) => format!("polygon ({} rings)", rings.len()),
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    app_data_dir().join("scout.db")
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path.unwrap_or_else(default_config_path)
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE_NAME)
}

fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Read the config file and overlay `SCOUT_*` environment variables.
pub fn load_client_config(config_path: &Path) -> Result<ClientConfig, CliError> {
    Ok(ClientConfig::load_from_path(config_path)?.with_env_overrides(|key| env::var(key).ok()))
}

pub async fn open_database(db_path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(db_path).await?)
}
