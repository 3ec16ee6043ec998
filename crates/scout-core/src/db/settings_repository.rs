//! Settings repository implementation

use crate::error::Result;
use crate::models::SyncSettings;
use crate::util::parse_flag;
use libsql::Connection;

/// Settings key for the observation fetch interval
pub const POLL_INTERVAL_KEY: &str = "observation_fetch_interval_secs";

/// Settings key for the background fetch switch
pub const FETCH_ENABLED_KEY: &str = "data_fetch_enabled";

/// Trait for settings storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    /// Load settings from the database
    async fn load(&self) -> Result<SyncSettings>;

    /// Save settings to the database
    async fn save(&self, settings: &SyncSettings) -> Result<()>;
}

/// libSQL implementation of `SettingsRepository`
pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn load(&self) -> Result<SyncSettings> {
        let mut settings = SyncSettings::default();

        if let Some(value) = self.get_setting(POLL_INTERVAL_KEY).await? {
            match value.trim().parse() {
                Ok(secs) => settings.poll_interval_secs = secs,
                Err(_) => tracing::warn!("Ignoring invalid poll interval setting: {value}"),
            }
        }

        if let Some(value) = self.get_setting(FETCH_ENABLED_KEY).await? {
            settings.fetch_enabled = parse_flag(&value);
        }

        Ok(settings)
    }

    async fn save(&self, settings: &SyncSettings) -> Result<()> {
        self.set_setting(POLL_INTERVAL_KEY, &settings.poll_interval_secs.to_string())
            .await?;
        self.set_setting(
            FETCH_ENABLED_KEY,
            if settings.fetch_enabled {
                "true"
            } else {
                "false"
            },
        )
        .await?;
        Ok(())
    }
}

impl LibSqlSettingsRepository<'_> {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}
