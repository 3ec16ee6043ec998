//! Sync preference settings model

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default observation fetch interval in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Smallest interval the scheduler will honor
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Persisted sync preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Seconds between observation fetches
    pub poll_interval_secs: u64,
    /// Whether background fetching is enabled
    pub fetch_enabled: bool,
}

impl SyncSettings {
    /// Effective poll interval, clamped to the minimum
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            fetch_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = SyncSettings::default();
        assert_eq!(settings.poll_interval(), Duration::from_secs(60));
        assert!(settings.fetch_enabled);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let settings = SyncSettings {
            poll_interval_secs: 0,
            fetch_enabled: true,
        };
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
    }
}
