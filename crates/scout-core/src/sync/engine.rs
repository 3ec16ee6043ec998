//! Long-running sync loop with an interruptible, live-tunable wait.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::reconcile::{PassSummary, Reconciler};
use super::wake::WakeSignal;
use super::{
    ConnectivityMonitor, ObservationStore, PreferenceKey, RemoteObservationSource,
    SyncPreferences, UserDirectory,
};
use crate::error::Result;
use crate::state::{SyncState, SyncStatus};
use crate::util::unix_millis_now;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WaitOutcome {
    Elapsed,
    Woken,
    Cancelled,
}

/// Runs reconcile passes forever: one pass, then a wait of the current poll
/// interval measured from the end of that pass.
///
/// The wait ends early when the wake signal is raised, which happens on a
/// poll-interval or fetch-enabled change, on regaining connectivity, and on
/// [`SyncHandle::request_sync`]. Cancellation ends the wait immediately and
/// stops the loop before the next pass; a pass already running completes.
pub struct SyncEngine<S, U, R> {
    reconciler: Reconciler<S, U, R>,
    preferences: Arc<dyn SyncPreferences>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    wake: Arc<WakeSignal>,
    cancel: CancellationToken,
    status: watch::Sender<SyncStatus>,
}

impl<S, U, R> SyncEngine<S, U, R>
where
    S: ObservationStore,
    U: UserDirectory,
    R: RemoteObservationSource,
{
    pub fn new(
        reconciler: Reconciler<S, U, R>,
        preferences: Arc<dyn SyncPreferences>,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> Self {
        Self {
            reconciler,
            preferences,
            connectivity,
            wake: Arc::new(WakeSignal::new()),
            cancel: CancellationToken::new(),
            status: watch::channel(SyncStatus::new()).0,
        }
    }

    /// Stop the engine when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start the loop and its event forwarders on the current runtime.
    pub fn spawn(self) -> SyncHandle {
        let wake = Arc::clone(&self.wake);
        let cancel = self.cancel.clone();
        let status = self.status.subscribe();

        // Subscribe before spawning so no event between now and the first
        // poll of the forwarders is missed.
        let forwarders = vec![
            forward_preference_changes(
                self.preferences.on_change(),
                Arc::clone(&wake),
                cancel.clone(),
            ),
            forward_became_connected(
                self.connectivity.on_became_connected(),
                Arc::clone(&wake),
                cancel.clone(),
            ),
        ];
        let task = tokio::spawn(self.run());

        SyncHandle {
            wake,
            cancel,
            status,
            task,
            forwarders,
        }
    }

    async fn run(self) {
        tracing::info!(
            "Sync engine started (poll interval {}s)",
            self.preferences.poll_interval().as_secs()
        );

        while !self.cancel.is_cancelled() {
            self.run_cycle().await;

            match self.wait_for_next_cycle(Instant::now()).await {
                WaitOutcome::Cancelled => break,
                WaitOutcome::Woken => tracing::debug!("Sync wait interrupted; starting pass early"),
                WaitOutcome::Elapsed => {}
            }
            self.wake.take();
        }

        tracing::info!("Sync engine stopped");
    }

    async fn run_cycle(&self) {
        if !self.preferences.is_fetch_enabled() {
            tracing::debug!("Observation fetch disabled; skipping pass");
            self.publish_state(SyncState::Disabled);
            return;
        }
        if !self.connectivity.is_online() {
            tracing::debug!("Offline; skipping observation pass");
            self.publish_state(SyncState::Offline);
            return;
        }

        self.publish_state(SyncState::Syncing);
        let result = self.reconciler.run_pass().await;
        self.publish_pass_result(result);
    }

    async fn wait_for_next_cycle(&self, cycle_end: Instant) -> WaitOutcome {
        loop {
            if self.cancel.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            if self.wake.is_set() {
                return WaitOutcome::Woken;
            }

            // Re-read on every wakeup; the interval may have changed mid-wait.
            let deadline = cycle_end + self.preferences.poll_interval();
            if Instant::now() >= deadline {
                return WaitOutcome::Elapsed;
            }

            tracing::debug!(
                "Next observation pass in {}s",
                deadline.saturating_duration_since(Instant::now()).as_secs()
            );
            tokio::select! {
                () = self.cancel.cancelled() => return WaitOutcome::Cancelled,
                () = self.wake.notified() => {}
                () = tokio::time::sleep_until(deadline) => {}
            }
        }
    }

    fn publish_state(&self, state: SyncState) {
        self.status.send_modify(|status| status.state = state);
    }

    fn publish_pass_result(&self, result: Result<PassSummary>) {
        self.status.send_modify(|status| match result {
            Ok(summary) => {
                status.state = SyncState::Synced;
                status.passes += 1;
                status.last_synced_at = Some(unix_millis_now());
                status.last_summary = Some(summary);
                status.last_error = None;
            }
            Err(error) => {
                tracing::error!("Observation fetch failed: {error}");
                status.state = SyncState::Error;
                status.passes += 1;
                status.last_error = Some(error.to_string());
            }
        });
    }
}

fn forward_preference_changes(
    mut changes: broadcast::Receiver<PreferenceKey>,
    wake: Arc<WakeSignal>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => break,
                received = changes.recv() => received,
            };
            match received {
                Ok(key @ (PreferenceKey::PollInterval | PreferenceKey::FetchEnabled)) => {
                    tracing::debug!("Preference {key:?} changed; waking sync engine");
                    wake.signal();
                }
                Err(RecvError::Lagged(_)) => wake.signal(),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn forward_became_connected(
    mut events: broadcast::Receiver<()>,
    wake: Arc<WakeSignal>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => break,
                received = events.recv() => received,
            };
            match received {
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    tracing::debug!("Connectivity restored; waking sync engine");
                    wake.signal();
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Control surface for a spawned [`SyncEngine`]
pub struct SyncHandle {
    wake: Arc<WakeSignal>,
    cancel: CancellationToken,
    status: watch::Receiver<SyncStatus>,
    task: JoinHandle<()>,
    forwarders: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    /// Run a pass as soon as the current one (if any) finishes.
    pub fn request_sync(&self) {
        self.wake.signal();
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to exit. Only returns after [`Self::shutdown`] or
    /// cancellation of the engine's token.
    pub async fn join(self) {
        if let Err(error) = self.task.await {
            tracing::error!("Sync engine task failed: {error}");
        }
        self.cancel.cancel();
        for forwarder in self.forwarders {
            if let Err(error) = forwarder.await {
                tracing::error!("Sync event forwarder failed: {error}");
            }
        }
    }
}
