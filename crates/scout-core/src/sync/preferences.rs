//! Live, observable sync preferences.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;

use super::SyncPreferences;
use crate::models::SyncSettings;

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Preference that changed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PreferenceKey {
    PollInterval,
    FetchEnabled,
}

/// In-memory `SyncSettings` that publishes a `PreferenceKey` for every value
/// that actually changes.
#[derive(Debug)]
pub struct LivePreferences {
    settings: RwLock<SyncSettings>,
    changes: broadcast::Sender<PreferenceKey>,
}

impl LivePreferences {
    pub fn new(settings: SyncSettings) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            settings: RwLock::new(settings),
            changes,
        }
    }

    pub fn snapshot(&self) -> SyncSettings {
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_poll_interval_secs(&self, secs: u64) {
        self.replace(SyncSettings {
            poll_interval_secs: secs,
            ..self.snapshot()
        });
    }

    pub fn set_fetch_enabled(&self, enabled: bool) {
        self.replace(SyncSettings {
            fetch_enabled: enabled,
            ..self.snapshot()
        });
    }

    /// Swap in a full settings value, notifying once per changed key.
    pub fn replace(&self, next: SyncSettings) -> Vec<PreferenceKey> {
        let changed = {
            let mut current = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            let mut changed = Vec::new();
            if current.poll_interval_secs != next.poll_interval_secs {
                changed.push(PreferenceKey::PollInterval);
            }
            if current.fetch_enabled != next.fetch_enabled {
                changed.push(PreferenceKey::FetchEnabled);
            }
            *current = next;
            changed
        };

        for key in &changed {
            tracing::debug!("Sync preference changed: {key:?}");
            // No receivers is fine.
            let _ = self.changes.send(*key);
        }
        changed
    }
}

impl Default for LivePreferences {
    fn default() -> Self {
        Self::new(SyncSettings::default())
    }
}

impl SyncPreferences for LivePreferences {
    fn poll_interval(&self) -> Duration {
        self.snapshot().poll_interval()
    }

    fn is_fetch_enabled(&self) -> bool {
        self.snapshot().fetch_enabled
    }

    fn on_change(&self) -> broadcast::Receiver<PreferenceKey> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn only_actual_changes_are_published() {
        let preferences = LivePreferences::default();
        let mut changes = preferences.on_change();

        preferences.set_fetch_enabled(true);
        assert_eq!(changes.try_recv(), Err(TryRecvError::Empty));

        preferences.set_poll_interval_secs(5);
        assert_eq!(changes.try_recv(), Ok(PreferenceKey::PollInterval));
        assert_eq!(preferences.poll_interval(), Duration::from_secs(5));

        preferences.set_fetch_enabled(false);
        assert_eq!(changes.try_recv(), Ok(PreferenceKey::FetchEnabled));
        assert!(!preferences.is_fetch_enabled());
    }

    #[test]
    fn replace_reports_every_changed_key() {
        let preferences = LivePreferences::default();
        let changed = preferences.replace(SyncSettings {
            poll_interval_secs: 300,
            fetch_enabled: false,
        });
        assert_eq!(
            changed,
            vec![PreferenceKey::PollInterval, PreferenceKey::FetchEnabled]
        );
        assert!(preferences.replace(preferences.snapshot()).is_empty());
    }

    #[test]
    fn zero_interval_is_clamped() {
        let preferences = LivePreferences::default();
        preferences.set_poll_interval_secs(0);
        assert_eq!(preferences.poll_interval(), Duration::from_secs(1));
    }
}
