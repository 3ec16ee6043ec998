//! Shared database service wrapper used by the sync engine and the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    Database, LibSqlObservationRepository, LibSqlSettingsRepository, LibSqlUserRepository,
    ObservationRepository, SettingsRepository, UserRepository,
};
use crate::models::{Observation, ObservationId, SyncSettings, User};
use crate::sync::ObservationStore;
use crate::Result;

/// Thread-safe, explicitly opened and closed storage context.
///
/// Clones share one connection; every operation takes the lock, so writes
/// are serialized.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Option<Database>>>,
    db_path: Option<PathBuf>,
}

impl std::fmt::Debug for DatabaseService {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DatabaseService")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::info!("Opened local store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(Some(db))),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(Some(db))),
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Close the underlying database. Later operations on any clone fail.
    pub async fn close(&self) {
        if let Some(db) = self.db.lock().await.take() {
            db.close();
        }
    }

    /// Fetch an observation by local id.
    pub async fn get_observation(&self, id: &ObservationId) -> Result<Option<Observation>> {
        let guard = self.db.lock().await;
        let repo = LibSqlObservationRepository::new(Self::open_db(&guard)?.connection());
        repo.get(id).await
    }

    /// Fetch an observation by server id.
    pub async fn get_observation_by_remote_id(
        &self,
        remote_id: &str,
    ) -> Result<Option<Observation>> {
        let guard = self.db.lock().await;
        let repo = LibSqlObservationRepository::new(Self::open_db(&guard)?.connection());
        repo.read_by_remote_id(remote_id).await
    }

    pub async fn create_observation(&self, observation: &Observation) -> Result<Observation> {
        let guard = self.db.lock().await;
        let repo = LibSqlObservationRepository::new(Self::open_db(&guard)?.connection());
        repo.create(observation).await
    }

    pub async fn update_observation(&self, observation: &Observation) -> Result<Observation> {
        let guard = self.db.lock().await;
        let repo = LibSqlObservationRepository::new(Self::open_db(&guard)?.connection());
        repo.update(observation).await
    }

    /// Update an observation unless it carries local edits.
    pub async fn update_observation_if_clean(&self, observation: &Observation) -> Result<bool> {
        let guard = self.db.lock().await;
        let repo = LibSqlObservationRepository::new(Self::open_db(&guard)?.connection());
        repo.update_if_clean(observation).await
    }

    /// Delete an observation with its properties and attachments.
    pub async fn delete_observation(&self, id: &ObservationId) -> Result<()> {
        let guard = self.db.lock().await;
        let repo = LibSqlObservationRepository::new(Self::open_db(&guard)?.connection());
        repo.delete(id).await
    }

    /// List observations newest-first.
    pub async fn list_observations(&self, limit: usize, offset: usize) -> Result<Vec<Observation>> {
        let guard = self.db.lock().await;
        let repo = LibSqlObservationRepository::new(Self::open_db(&guard)?.connection());
        repo.list(limit, offset).await
    }

    /// List observations with unpushed local edits.
    pub async fn list_dirty_observations(&self) -> Result<Vec<Observation>> {
        let guard = self.db.lock().await;
        let repo = LibSqlObservationRepository::new(Self::open_db(&guard)?.connection());
        repo.list_dirty().await
    }

    pub async fn count_observations(&self) -> Result<usize> {
        let guard = self.db.lock().await;
        let repo = LibSqlObservationRepository::new(Self::open_db(&guard)?.connection());
        repo.count().await
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let guard = self.db.lock().await;
        let repo = LibSqlUserRepository::new(Self::open_db(&guard)?.connection());
        repo.get(id).await
    }

    pub async fn upsert_user(&self, user: &User) -> Result<()> {
        let guard = self.db.lock().await;
        let repo = LibSqlUserRepository::new(Self::open_db(&guard)?.connection());
        repo.upsert(user).await
    }

    /// Load sync preferences.
    pub async fn load_settings(&self) -> Result<SyncSettings> {
        let guard = self.db.lock().await;
        let repo = LibSqlSettingsRepository::new(Self::open_db(&guard)?.connection());
        repo.load().await
    }

    /// Save sync preferences.
    pub async fn save_settings(&self, settings: &SyncSettings) -> Result<()> {
        let guard = self.db.lock().await;
        let repo = LibSqlSettingsRepository::new(Self::open_db(&guard)?.connection());
        repo.save(settings).await
    }

    fn open_db(slot: &Option<Database>) -> Result<&Database> {
        slot.as_ref()
            .ok_or_else(|| crate::Error::Database("database is closed".to_string()))
    }
}

impl ObservationStore for DatabaseService {
    async fn read_by_remote_id(&self, remote_id: &str) -> Result<Option<Observation>> {
        self.get_observation_by_remote_id(remote_id).await
    }

    async fn create(&self, observation: &Observation) -> Result<Observation> {
        self.create_observation(observation).await
    }

    async fn update(&self, observation: &Observation) -> Result<Observation> {
        self.update_observation(observation).await
    }

    async fn update_if_clean(&self, observation: &Observation) -> Result<bool> {
        self.update_observation_if_clean(observation).await
    }

    async fn delete(&self, id: &ObservationId) -> Result<()> {
        self.delete_observation(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Geometry, ObservationState, RemoteObservation};
    use crate::remote::RemoteRecord;
    use crate::sync::{Reconciler, RemoteObservationSource, UserDirectory};
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, BTreeSet};

    struct Snapshot(Vec<RemoteObservation>);

    impl RemoteObservationSource for Snapshot {
        async fn fetch_all(&self) -> Result<Vec<RemoteRecord>> {
            Ok(self.0.iter().cloned().map(Ok).collect())
        }
    }

    struct NoUsers;

    impl UserDirectory for NoUsers {
        async fn read_by_id(&self, _id: &str) -> Result<Option<User>> {
            Ok(None)
        }

        async fn refresh(&self, _ids: BTreeSet<String>) -> Result<()> {
            Ok(())
        }
    }

    fn remote(remote_id: &str, state: ObservationState) -> RemoteObservation {
        RemoteObservation {
            remote_id: remote_id.to_string(),
            url: None,
            user_id: None,
            device_id: None,
            last_modified: Some(1_700_000_000_000),
            timestamp: Some(1_700_000_000_000),
            state,
            geometry: Geometry::point(-105.0, 40.0),
            properties: BTreeMap::from([("type".to_string(), "Wildlife".to_string())]),
            attachments: Vec::new(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_create_and_list_roundtrip() {
        let service = DatabaseService::open_in_memory().await.unwrap();

        let local = Observation::new_local(Geometry::point(1.0, 2.0), BTreeMap::new(), 5);
        service.create_observation(&local).await.unwrap();

        let listed = service.list_observations(10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, local.id);
        assert_eq!(service.list_dirty_observations().await.unwrap().len(), 1);
        assert_eq!(service.count_observations().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn settings_roundtrip() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let settings = SyncSettings {
            poll_interval_secs: 120,
            fetch_enabled: false,
        };
        service.save_settings(&settings).await.unwrap();
        assert_eq!(service.load_settings().await.unwrap(), settings);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn closed_service_rejects_operations() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let clone = service.clone();
        service.close().await;

        assert!(matches!(
            clone.count_observations().await,
            Err(crate::Error::Database(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconcile_pass_against_libsql_store() {
        let service = Arc::new(DatabaseService::open_in_memory().await.unwrap());

        let mut edited = Observation::from_remote(&remote("B", ObservationState::Active));
        edited.dirty = true;
        edited.add_properties([("type", "Edited locally")]);
        service.create_observation(&edited).await.unwrap();
        service
            .create_observation(&Observation::from_remote(&remote("C", ObservationState::Active)))
            .await
            .unwrap();

        let source = Arc::new(Snapshot(vec![
            remote("A", ObservationState::Active),
            remote("B", ObservationState::Active),
            remote("C", ObservationState::Archive),
        ]));
        let reconciler = Reconciler::new(Arc::clone(&service), Arc::new(NoUsers), source);

        let summary = reconciler.run_pass().await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped_dirty, 1);
        assert_eq!(summary.deleted, 1);

        let created = service.get_observation_by_remote_id("A").await.unwrap().unwrap();
        assert!(!created.dirty);
        let kept = service.get_observation_by_remote_id("B").await.unwrap().unwrap();
        assert_eq!(kept.property("type"), Some("Edited locally"));
        assert!(service.get_observation_by_remote_id("C").await.unwrap().is_none());

        let second = reconciler.run_pass().await.unwrap();
        assert_eq!(second.mutations(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_backed_service_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scout.db");

        let service = DatabaseService::open_path(&path).await.unwrap();
        assert_eq!(service.path(), Some(path.as_path()));
        service.close().await;
        assert!(path.exists());
    }
}
