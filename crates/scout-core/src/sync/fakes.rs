//! In-memory collaborators for reconciler and scheduler tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};

use super::{AlertSink, ObservationStore, RemoteObservationSource, UserDirectory};
use crate::error::{Error, Result};
use crate::models::{Geometry, Observation, ObservationId, ObservationState, RemoteObservation, User};
use crate::remote::{RemoteError, RemoteRecord};
use crate::util::unix_millis_now;

pub fn remote_observation(
    remote_id: &str,
    state: ObservationState,
    last_modified: i64,
) -> RemoteObservation {
    RemoteObservation {
        remote_id: remote_id.to_string(),
        url: None,
        user_id: None,
        device_id: None,
        last_modified: Some(last_modified),
        timestamp: Some(last_modified),
        state,
        geometry: Geometry::point(-105.08, 40.57),
        properties: BTreeMap::from([("type".to_string(), "Hazard".to_string())]),
        attachments: Vec::new(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreCall {
    Read,
    Create,
    Update,
    Delete,
}

#[derive(Default)]
pub struct MemoryStore {
    observations: Mutex<HashMap<ObservationId, Observation>>,
    calls: Mutex<Vec<StoreCall>>,
    failing: Mutex<HashSet<String>>,
    edit_after_read: Mutex<HashSet<String>>,
}

impl MemoryStore {
    /// Seed a record without recording a call
    pub fn insert(&self, observation: Observation) {
        self.observations
            .lock()
            .unwrap()
            .insert(observation.id, observation);
    }

    /// Make writes for this remote id fail
    pub fn fail_remote_id(&self, remote_id: &str) {
        self.failing.lock().unwrap().insert(remote_id.to_string());
    }

    /// Mark this record dirty right after the next read returns its clean copy
    pub fn edit_after_read(&self, remote_id: &str) {
        self.edit_after_read
            .lock()
            .unwrap()
            .insert(remote_id.to_string());
    }

    pub fn get_by_remote_id(&self, remote_id: &str) -> Option<Observation> {
        self.observations
            .lock()
            .unwrap()
            .values()
            .find(|observation| observation.remote_id.as_deref() == Some(remote_id))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.lock().unwrap().is_empty()
    }

    pub fn calls_of(&self, kind: StoreCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| **call == kind).count()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call != StoreCall::Read)
            .count()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_failing(&self, observation: &Observation) -> Result<()> {
        let failing = self.failing.lock().unwrap();
        match observation.remote_id.as_deref() {
            Some(remote_id) if failing.contains(remote_id) => {
                Err(Error::Database(format!("write rejected for {remote_id}")))
            }
            _ => Ok(()),
        }
    }
}

impl ObservationStore for MemoryStore {
    async fn read_by_remote_id(&self, remote_id: &str) -> Result<Option<Observation>> {
        self.record(StoreCall::Read);
        let found = self.get_by_remote_id(remote_id);
        let edit = self.edit_after_read.lock().unwrap().remove(remote_id);
        if let (true, Some(local)) = (edit, &found) {
            let mut edited = local.clone();
            edited.dirty = true;
            edited.add_properties([("note", "edited during pass")]);
            self.insert(edited);
        }
        Ok(found)
    }

    async fn create(&self, observation: &Observation) -> Result<Observation> {
        self.record(StoreCall::Create);
        self.check_failing(observation)?;
        self.insert(observation.clone());
        Ok(observation.clone())
    }

    async fn update(&self, observation: &Observation) -> Result<Observation> {
        self.record(StoreCall::Update);
        self.check_failing(observation)?;
        let mut observations = self.observations.lock().unwrap();
        if !observations.contains_key(&observation.id) {
            return Err(Error::NotFound(observation.id.to_string()));
        }
        observations.insert(observation.id, observation.clone());
        Ok(observation.clone())
    }

    async fn update_if_clean(&self, observation: &Observation) -> Result<bool> {
        self.record(StoreCall::Update);
        self.check_failing(observation)?;
        let mut observations = self.observations.lock().unwrap();
        match observations.get(&observation.id) {
            None => Err(Error::NotFound(observation.id.to_string())),
            Some(stored) if stored.dirty => Ok(false),
            Some(_) => {
                observations.insert(observation.id, observation.clone());
                Ok(true)
            }
        }
    }

    async fn delete(&self, id: &ObservationId) -> Result<()> {
        self.record(StoreCall::Delete);
        self.observations
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

pub struct MemoryUsers {
    users: Mutex<HashMap<String, User>>,
    refreshed: watch::Sender<Vec<String>>,
    fail: AtomicBool,
}

impl Default for MemoryUsers {
    fn default() -> Self {
        Self {
            users: Mutex::default(),
            refreshed: watch::channel(Vec::new()).0,
            fail: AtomicBool::new(false),
        }
    }
}

impl MemoryUsers {
    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }

    pub fn fail_refreshes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Sorted ids refreshed so far, once at least `count` have arrived
    pub async fn wait_for_refreshes(&self, count: usize, timeout: Duration) -> Vec<String> {
        let mut receiver = self.refreshed.subscribe();
        let mut ids = tokio::time::timeout(timeout, receiver.wait_for(|ids| ids.len() >= count))
            .await
            .expect("refreshes did not arrive in time")
            .unwrap()
            .clone();
        ids.sort();
        ids
    }
}

impl UserDirectory for MemoryUsers {
    async fn read_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn refresh(&self, ids: BTreeSet<String>) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Remote(RemoteError::Api("HTTP 503".to_string())));
        }
        for id in ids {
            self.insert(User {
                id: id.clone(),
                username: id.clone(),
                display_name: None,
                email: None,
                phone: None,
                fetched_date: unix_millis_now(),
            });
            self.refreshed.send_modify(|refreshed| refreshed.push(id));
        }
        Ok(())
    }
}

/// Scripted remote snapshot with optional fetch gating
pub struct FakeSource {
    snapshot: Mutex<Vec<std::result::Result<RemoteObservation, String>>>,
    fail_next: Mutex<Option<String>>,
    fetches: watch::Sender<usize>,
    gated: AtomicBool,
    gate: Semaphore,
}

impl Default for FakeSource {
    fn default() -> Self {
        Self {
            snapshot: Mutex::default(),
            fail_next: Mutex::default(),
            fetches: watch::channel(0).0,
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }
}

impl FakeSource {
    pub fn set_snapshot(&self, records: Vec<RemoteRecord>) {
        *self.snapshot.lock().unwrap() = records
            .into_iter()
            .map(|record| record.map_err(|error| error.to_string()))
            .collect();
    }

    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock().unwrap() = Some(message.to_string());
    }

    /// Hold every subsequent fetch until `release_one` is called
    pub fn gate_fetches(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn release_one(&self) {
        self.gate.add_permits(1);
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.borrow()
    }

    /// Resolves once `count` fetches have started
    pub async fn wait_for_fetches(&self, count: usize) {
        let mut receiver = self.fetches.subscribe();
        receiver.wait_for(|fetches| *fetches >= count).await.unwrap();
    }
}

impl RemoteObservationSource for FakeSource {
    async fn fetch_all(&self) -> Result<Vec<RemoteRecord>> {
        self.fetches.send_modify(|fetches| *fetches += 1);

        if self.gated.load(Ordering::SeqCst) {
            self.gate
                .acquire()
                .await
                .map_err(|error| Error::Database(error.to_string()))?
                .forget();
        }

        if let Some(message) = self.fail_next.lock().unwrap().take() {
            return Err(Error::Remote(RemoteError::Api(message)));
        }

        Ok(self
            .snapshot
            .lock()
            .unwrap()
            .iter()
            .map(|record| match record {
                Ok(remote) => Ok(remote.clone()),
                Err(reason) => Err(Error::malformed(None, reason.clone())),
            })
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    remote_ids: Mutex<Vec<String>>,
}

impl RecordingAlerts {
    pub fn remote_ids(&self) -> Vec<String> {
        self.remote_ids.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn high_priority(&self, observation: &Observation) {
        self.remote_ids
            .lock()
            .unwrap()
            .push(observation.remote_id.clone().unwrap_or_default());
    }
}
