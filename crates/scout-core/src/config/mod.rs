//! Client configuration.
//!
//! `ClientConfig` is the persisted JSON document describing which server and
//! event the client synchronizes with. Sync preferences (poll interval, fetch
//! switch) are not stored here; they live in the local database so a running
//! engine can observe changes.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const CONFIG_FILE_NAME: &str = "config.json";

pub const SERVER_URL_ENV: &str = "SCOUT_SERVER_URL";
pub const AUTH_TOKEN_ENV: &str = "SCOUT_AUTH_TOKEN";
pub const EVENT_ID_ENV: &str = "SCOUT_EVENT_ID";

const DEFAULT_CONNECTIVITY_PROBE_SECS: u64 = 15;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default = "default_connectivity_probe_secs")]
    pub connectivity_probe_secs: u64,
}

const fn default_connectivity_probe_secs() -> u64 {
    DEFAULT_CONNECTIVITY_PROBE_SECS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            auth_token: None,
            event_id: None,
            connectivity_probe_secs: DEFAULT_CONNECTIVITY_PROBE_SECS,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("event_id", &self.event_id)
            .field("connectivity_probe_secs", &self.connectivity_probe_secs)
            .finish()
    }
}

/// Validated settings needed to talk to the observation server
#[derive(Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub server_url: String,
    pub auth_token: Option<String>,
    pub event_id: String,
    pub request_timeout: Option<Duration>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServerConfig")
            .field("server_url", &self.server_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("event_id", &self.event_id)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ClientConfig {
    /// Load the config at `path`, returning defaults when the file does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::InvalidInput(format!(
                "Failed to parse config at {}: {error}",
                path.display()
            ))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Overlay values from the environment.
    ///
    /// `lookup` is usually `|key| std::env::var(key).ok()`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = normalize_text_option(lookup(SERVER_URL_ENV)) {
            self.server_url = Some(value);
        }
        if let Some(value) = normalize_text_option(lookup(AUTH_TOKEN_ENV)) {
            self.auth_token = Some(value);
        }
        if let Some(value) = normalize_text_option(lookup(EVENT_ID_ENV)) {
            self.event_id = Some(value);
        }
        self.normalize();
        self
    }

    /// Interval between connectivity probes, never below one second
    pub fn connectivity_probe_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity_probe_secs.max(1))
    }

    /// Validate the fields required for syncing.
    pub fn server_config(&self) -> Result<ServerConfig> {
        let server_url = normalize_text_option(self.server_url.clone()).ok_or_else(|| {
            Error::InvalidInput(
                "server url is not configured (scout config set --server-url)".to_string(),
            )
        })?;
        if !is_http_url(&server_url) {
            return Err(Error::InvalidInput(
                "server url must include http:// or https://".to_string(),
            ));
        }
        let event_id = normalize_text_option(self.event_id.clone()).ok_or_else(|| {
            Error::InvalidInput(
                "event id is not configured (scout config set --event-id)".to_string(),
            )
        })?;

        Ok(ServerConfig {
            server_url,
            auth_token: normalize_text_option(self.auth_token.clone()),
            event_id,
            request_timeout: None,
        })
    }

    fn normalize(&mut self) {
        self.server_url = normalize_text_option(self.server_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.auth_token = normalize_text_option(self.auth_token.take());
        self.event_id = normalize_text_option(self.event_id.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn configured() -> ClientConfig {
        ClientConfig {
            server_url: Some("https://scout.example.com/".to_string()),
            auth_token: Some("token-1".to_string()),
            event_id: Some("7".to_string()),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_from_path(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.connectivity_probe_secs, 15);
    }

    #[test]
    fn save_normalizes_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = configured();
        config.auth_token = Some("   ".to_string());
        config.save_to_path(&path).unwrap();

        let loaded = ClientConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.server_url.as_deref(), Some("https://scout.example.com"));
        assert_eq!(loaded.auth_token, None);
        assert_eq!(loaded.event_id.as_deref(), Some("7"));
    }

    #[test]
    fn invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            ClientConfig::load_from_path(&path),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let config = configured().with_env_overrides(|key| match key {
            SERVER_URL_ENV => Some("http://localhost:4242/".to_string()),
            EVENT_ID_ENV => Some(" ".to_string()),
            _ => None,
        });

        assert_eq!(config.server_url.as_deref(), Some("http://localhost:4242"));
        assert_eq!(config.event_id.as_deref(), Some("7"));
        assert_eq!(config.auth_token.as_deref(), Some("token-1"));
    }

    #[test]
    fn server_config_requires_url_and_event() {
        assert!(ClientConfig::default().server_config().is_err());

        let mut config = configured();
        config.server_url = Some("scout.example.com".to_string());
        assert!(config.server_config().is_err());

        let mut config = configured();
        config.event_id = None;
        assert!(config.server_config().is_err());

        let server = configured().server_config().unwrap();
        assert_eq!(server.server_url, "https://scout.example.com/");
        assert_eq!(server.event_id, "7");
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", configured());
        assert!(!debug.contains("token-1"));
    }

    #[test]
    fn probe_interval_has_floor() {
        let config = ClientConfig {
            connectivity_probe_secs: 0,
            ..ClientConfig::default()
        };
        assert_eq!(config.connectivity_probe_interval(), Duration::from_secs(1));
    }
}
