//! Observation sync engine.
//!
//! The engine pulls the server's full observation snapshot on a live-tunable
//! cadence and reconciles it record by record against the local store. Local
//! records with unpushed edits (`dirty`) always win over the server.
//!
//! Everything the engine touches is reached through the collaborator traits
//! below so passes and scheduling can be exercised without network or disk.

mod connectivity;
mod engine;
#[cfg(test)]
mod fakes;
mod preferences;
mod reconcile;
mod users;
mod wake;

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::{Observation, ObservationId, User};
use crate::remote::{RemoteRecord, ServerClient};

pub use connectivity::{ConnectivityEdge, ManualConnectivity, ProbeConnectivity};
pub use engine::{SyncEngine, SyncHandle};
pub use preferences::{LivePreferences, PreferenceKey};
pub use reconcile::{
    AlertRule, PassSummary, ReconcileOutcome, Reconciler, TracingAlertSink,
    DEFAULT_ALERT_PROPERTY, DEFAULT_ALERT_VALUE,
};
pub use users::RemoteUserDirectory;
pub use wake::WakeSignal;

/// Local observation storage as seen by the reconciler
pub trait ObservationStore: Send + Sync + 'static {
    fn read_by_remote_id(
        &self,
        remote_id: &str,
    ) -> impl Future<Output = Result<Option<Observation>>> + Send;

    fn create(&self, observation: &Observation)
        -> impl Future<Output = Result<Observation>> + Send;

    fn update(&self, observation: &Observation)
        -> impl Future<Output = Result<Observation>> + Send;

    /// Write a server-driven update unless the stored record has become
    /// dirty since it was read. Returns whether the write happened.
    fn update_if_clean(&self, observation: &Observation)
        -> impl Future<Output = Result<bool>> + Send;

    fn delete(&self, id: &ObservationId) -> impl Future<Output = Result<()>> + Send;
}

/// Cached author profiles with a remote refresh
pub trait UserDirectory: Send + Sync + 'static {
    fn read_by_id(&self, id: &str) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Re-fetch the given profiles from the server and store them.
    fn refresh(&self, ids: BTreeSet<String>) -> impl Future<Output = Result<()>> + Send;
}

/// Source of the server's current observation snapshot
pub trait RemoteObservationSource: Send + Sync + 'static {
    /// Fetch every visible observation. Each element decodes independently.
    fn fetch_all(&self) -> impl Future<Output = Result<Vec<RemoteRecord>>> + Send;
}

pub trait SyncPreferences: Send + Sync {
    fn poll_interval(&self) -> Duration;

    fn is_fetch_enabled(&self) -> bool;

    /// Stream of keys whose value changed
    fn on_change(&self) -> broadcast::Receiver<PreferenceKey>;
}

pub trait ConnectivityMonitor: Send + Sync {
    fn is_online(&self) -> bool;

    /// One event per offline to online transition
    fn on_became_connected(&self) -> broadcast::Receiver<()>;
}

/// Best-effort local notification for high-priority observations
pub trait AlertSink: Send + Sync {
    fn high_priority(&self, observation: &Observation);
}

impl RemoteObservationSource for ServerClient {
    async fn fetch_all(&self) -> Result<Vec<RemoteRecord>> {
        Ok(self.fetch_observations().await?)
    }
}
