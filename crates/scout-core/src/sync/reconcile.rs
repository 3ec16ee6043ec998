//! Per-record reconciliation of a remote snapshot against the local store.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;

use super::{AlertSink, ObservationStore, RemoteObservationSource, UserDirectory};
use crate::error::Result;
use crate::models::{Observation, RemoteObservation};
use crate::util::unix_millis_now;

/// Property that marks an observation's priority
pub const DEFAULT_ALERT_PROPERTY: &str = "EVENTLEVEL";

/// Priority value that triggers a local alert
pub const DEFAULT_ALERT_VALUE: &str = "high";

/// What happened to one remote record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated,
    /// Local copy already matches the remote record
    Unchanged,
    Deleted,
    /// Local copy has unpushed edits
    SkippedDirty,
    /// Archived remotely and never seen locally
    SkippedMissing,
}

/// Counters for one reconcile pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub skipped_dirty: usize,
    pub skipped_missing: usize,
    pub failed: usize,
    pub malformed: usize,
    pub profile_refreshes: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Created => self.created += 1,
            ReconcileOutcome::Updated => self.updated += 1,
            ReconcileOutcome::Unchanged => self.unchanged += 1,
            ReconcileOutcome::Deleted => self.deleted += 1,
            ReconcileOutcome::SkippedDirty => self.skipped_dirty += 1,
            ReconcileOutcome::SkippedMissing => self.skipped_missing += 1,
        }
    }

    /// Number of local writes the pass performed
    pub const fn mutations(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl std::fmt::Display for PassSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fetched={} created={} updated={} unchanged={} deleted={} skipped_dirty={} \
             skipped_missing={} failed={} malformed={} profile_refreshes={}",
            self.fetched,
            self.created,
            self.updated,
            self.unchanged,
            self.deleted,
            self.skipped_dirty,
            self.skipped_missing,
            self.failed,
            self.malformed,
            self.profile_refreshes
        )
    }
}

/// Which newly created observations deserve a local alert
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertRule {
    pub property: String,
    pub value: String,
}

impl AlertRule {
    pub fn matches(&self, observation: &Observation) -> bool {
        observation
            .property(&self.property)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case(&self.value))
    }
}

impl Default for AlertRule {
    fn default() -> Self {
        Self {
            property: DEFAULT_ALERT_PROPERTY.to_string(),
            value: DEFAULT_ALERT_VALUE.to_string(),
        }
    }
}

/// Alert sink that only logs
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn high_priority(&self, observation: &Observation) {
        tracing::warn!("High priority observation received: {observation}");
    }
}

/// Applies remote snapshots to the local store.
pub struct Reconciler<S, U, R> {
    store: Arc<S>,
    users: Arc<U>,
    source: Arc<R>,
    alerts: Arc<dyn AlertSink>,
    alert_rule: AlertRule,
}

impl<S, U, R> Reconciler<S, U, R>
where
    S: ObservationStore,
    U: UserDirectory,
    R: RemoteObservationSource,
{
    pub fn new(store: Arc<S>, users: Arc<U>, source: Arc<R>) -> Self {
        Self {
            store,
            users,
            source,
            alerts: Arc::new(TracingAlertSink),
            alert_rule: AlertRule::default(),
        }
    }

    #[must_use]
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>, rule: AlertRule) -> Self {
        self.alerts = alerts;
        self.alert_rule = rule;
        self
    }

    /// Fetch the remote snapshot and reconcile every record.
    ///
    /// Only a failed fetch is an error. Malformed records and per-record
    /// storage failures are logged, counted, and skipped.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let records = self.source.fetch_all().await?;

        let mut summary = PassSummary {
            fetched: records.len(),
            ..PassSummary::default()
        };
        let mut requested_profiles = HashSet::new();
        let now_ms = unix_millis_now();

        for record in records {
            let remote = match record {
                Ok(remote) => remote,
                Err(error) => {
                    tracing::warn!("Skipping malformed remote observation: {error}");
                    summary.malformed += 1;
                    continue;
                }
            };

            if self
                .refresh_author_if_stale(&remote, now_ms, &mut requested_profiles)
                .await
            {
                summary.profile_refreshes += 1;
            }

            match self.reconcile(&remote).await {
                Ok(outcome) => summary.record(outcome),
                Err(error) => {
                    tracing::warn!(
                        "Failed to reconcile observation {}: {error}",
                        remote.remote_id
                    );
                    summary.failed += 1;
                }
            }
        }

        tracing::info!("Observation pass complete: {summary}");
        Ok(summary)
    }

    /// Decide and apply the action for one remote record.
    pub async fn reconcile(&self, remote: &RemoteObservation) -> Result<ReconcileOutcome> {
        let existing = self.store.read_by_remote_id(&remote.remote_id).await?;

        let outcome = match existing {
            Some(local) if local.dirty => {
                tracing::debug!(
                    "Keeping local edits for observation {}; remote revision {} ({}) not applied",
                    remote.remote_id,
                    remote
                        .last_modified
                        .map_or_else(|| "unknown".to_string(), |time| time.to_string()),
                    remote.state
                );
                ReconcileOutcome::SkippedDirty
            }
            Some(local) if remote.state.is_archived() => {
                self.store.delete(&local.id).await?;
                tracing::debug!("Deleted archived observation {}", remote.remote_id);
                ReconcileOutcome::Deleted
            }
            None if remote.state.is_archived() => ReconcileOutcome::SkippedMissing,
            None => {
                let created = self.store.create(&Observation::from_remote(remote)).await?;
                tracing::debug!("Created observation {}", remote.remote_id);
                if self.alert_rule.matches(&created) {
                    self.alerts.high_priority(&created);
                }
                ReconcileOutcome::Created
            }
            Some(local) if local.matches_remote(remote) => ReconcileOutcome::Unchanged,
            Some(mut local) => {
                local.apply_remote(remote);
                if self.store.update_if_clean(&local).await? {
                    tracing::debug!("Updated observation {}", remote.remote_id);
                    ReconcileOutcome::Updated
                } else {
                    tracing::debug!(
                        "Observation {} was edited locally during the pass; update skipped",
                        remote.remote_id
                    );
                    ReconcileOutcome::SkippedDirty
                }
            }
        };

        Ok(outcome)
    }

    /// Spawn a profile refresh for the record's author when the cached
    /// profile is missing or stale. Returns whether a refresh was issued.
    async fn refresh_author_if_stale(
        &self,
        remote: &RemoteObservation,
        now_ms: i64,
        requested: &mut HashSet<String>,
    ) -> bool {
        let Some(user_id) = remote.user_id.as_deref() else {
            return false;
        };
        if requested.contains(user_id) {
            return false;
        }

        let needs_refresh = match self.users.read_by_id(user_id).await {
            Ok(Some(user)) => user.is_stale(now_ms),
            Ok(None) => true,
            Err(error) => {
                tracing::debug!("Could not read cached user {user_id}: {error}");
                true
            }
        };
        if !needs_refresh {
            return false;
        }

        requested.insert(user_id.to_string());
        let users = Arc::clone(&self.users);
        let ids = BTreeSet::from([user_id.to_string()]);
        tokio::spawn(async move {
            if let Err(error) = users.refresh(ids).await {
                tracing::debug!("User profile refresh failed: {error}");
            }
        });
        true
    }
}
