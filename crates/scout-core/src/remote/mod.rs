//! HTTP client for the observation server.

mod payload;

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub use payload::{decode_observation, decode_user};

use crate::config::ServerConfig;
use crate::models::{RemoteObservation, User};
use crate::util::{compact_text, is_http_url, normalize_text_option, unix_millis_now};

/// Per-request timeout applied to every server call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Invalid server configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Server HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server API error: {0}")]
    Api(String),
    #[error("Invalid server payload: {0}")]
    InvalidPayload(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// One decoded element of a fetch snapshot
pub type RemoteRecord = crate::Result<RemoteObservation>;

#[derive(Clone)]
pub struct ServerClient {
    base_url: String,
    event_id: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for ServerClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServerClient")
            .field("base_url", &self.base_url)
            .field("event_id", &self.event_id)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl ServerClient {
    pub fn new(config: &ServerConfig) -> RemoteResult<Self> {
        let base_url = normalize_base_url(config.server_url.clone())?;
        let event_id = normalize_text_option(Some(config.event_id.clone())).ok_or_else(|| {
            RemoteError::InvalidConfiguration("event id must not be empty".to_string())
        })?;

        Ok(Self {
            base_url,
            event_id,
            auth_token: normalize_text_option(config.auth_token.clone()),
            client: reqwest::Client::builder()
                .timeout(config.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
                .build()?,
        })
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the full snapshot of observations visible to the configured user.
    ///
    /// Transport failures and a non-array body fail the whole call; each
    /// array element is decoded independently.
    pub async fn fetch_observations(&self) -> RemoteResult<Vec<RemoteRecord>> {
        let url = format!(
            "{}/api/events/{}/observations",
            self.base_url,
            urlencoding::encode(&self.event_id)
        );
        let body = self.get_json(&url).await?;

        let Value::Array(elements) = body else {
            return Err(RemoteError::InvalidPayload(
                "observations response is not a JSON array".to_string(),
            ));
        };

        Ok(elements.into_iter().map(decode_observation).collect())
    }

    /// Fetch a single user profile.
    pub async fn fetch_user(&self, user_id: &str) -> crate::Result<User> {
        let url = format!(
            "{}/api/users/{}",
            self.base_url,
            urlencoding::encode(user_id)
        );
        let body = self.get_json(&url).await?;
        decode_user(body, unix_millis_now())
    }

    async fn get_json(&self, url: &str) -> RemoteResult<Value> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|error| RemoteError::InvalidPayload(format!("{error}: {}", compact_text(&body))))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> RemoteResult<String> {
    let url = normalize_text_option(Some(raw)).ok_or_else(|| {
        RemoteError::InvalidConfiguration("server url must not be empty".to_string())
    })?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::InvalidConfiguration(
            "server url must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(server_url: &str) -> ServerConfig {
        ServerConfig {
            server_url: server_url.to_string(),
            auth_token: Some("secret-token".to_string()),
            event_id: "7".to_string(),
            request_timeout: None,
        }
    }

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("scout.example.com".to_string()).is_err());
    }

    #[test]
    fn new_trims_trailing_slash() {
        let client = ServerClient::new(&config("https://scout.example.com/")).unwrap();
        assert_eq!(client.base_url(), "https://scout.example.com");
    }

    #[test]
    fn new_requires_event_id() {
        let mut config = config("https://scout.example.com");
        config.event_id = "  ".to_string();
        assert!(matches!(
            ServerClient::new(&config),
            Err(RemoteError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn debug_redacts_token() {
        let client = ServerClient::new(&config("https://scout.example.com")).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        let message = parse_api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"message": "token expired"}"#,
        );
        assert_eq!(message, "token expired (401)");
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }
}
