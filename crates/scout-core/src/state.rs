//! Shared sync status types.

use serde::Serialize;

use crate::sync::PassSummary;

/// Where the sync engine stands after its latest cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Offline,
    Syncing,
    Synced,
    Error,
    Disabled,
}

impl SyncState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Snapshot published by the engine after every cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Completed reconcile passes since start
    pub passes: u64,
    /// End of the last successful pass (Unix ms)
    pub last_synced_at: Option<i64>,
    pub last_summary: Option<PassSummary>,
    pub last_error: Option<String>,
}

impl SyncStatus {
    pub const fn new() -> Self {
        Self {
            state: SyncState::Offline,
            passes: 0,
            last_synced_at: None,
            last_summary: None,
            last_error: None,
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::new()
    }
}
