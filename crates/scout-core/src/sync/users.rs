//! Author profile cache backed by the local store and the server.

use std::collections::BTreeSet;

use super::UserDirectory;
use crate::error::Result;
use crate::models::User;
use crate::remote::ServerClient;
use crate::services::DatabaseService;

/// Reads cached profiles locally and refreshes them from the server.
#[derive(Clone, Debug)]
pub struct RemoteUserDirectory {
    db: DatabaseService,
    client: ServerClient,
}

impl RemoteUserDirectory {
    pub const fn new(db: DatabaseService, client: ServerClient) -> Self {
        Self { db, client }
    }
}

impl UserDirectory for RemoteUserDirectory {
    async fn read_by_id(&self, id: &str) -> Result<Option<User>> {
        self.db.get_user(id).await
    }

    /// Profiles that fail to fetch are logged and skipped; the next pass
    /// that sees them stale tries again.
    async fn refresh(&self, ids: BTreeSet<String>) -> Result<()> {
        for id in ids {
            match self.client.fetch_user(&id).await {
                Ok(user) => {
                    self.db.upsert_user(&user).await?;
                    tracing::debug!("Refreshed user profile {}", user.id);
                }
                Err(error) => tracing::warn!("Failed to refresh user profile {id}: {error}"),
            }
        }
        Ok(())
    }
}
