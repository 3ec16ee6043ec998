//! Observation repository implementation

use std::collections::BTreeMap;

use libsql::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{Attachment, Geometry, Observation, ObservationId, ObservationState};

/// Trait for observation storage operations (async)
#[allow(async_fn_in_trait)]
pub trait ObservationRepository {
    /// Insert a new observation with its properties and attachments
    async fn create(&self, observation: &Observation) -> Result<Observation>;

    /// Get an observation by local ID
    async fn get(&self, id: &ObservationId) -> Result<Option<Observation>>;

    /// Get an observation by server-assigned ID
    async fn read_by_remote_id(&self, remote_id: &str) -> Result<Option<Observation>>;

    /// Replace an existing observation's stored fields, keyed by local ID
    async fn update(&self, observation: &Observation) -> Result<Observation>;

    /// Replace a stored observation only while it has no local edits.
    ///
    /// Returns `false` without writing when the stored row is dirty.
    async fn update_if_clean(&self, observation: &Observation) -> Result<bool>;

    /// Delete an observation and everything it owns
    async fn delete(&self, id: &ObservationId) -> Result<()>;

    /// List observations, most recent first
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Observation>>;

    /// List observations with unpushed local edits
    async fn list_dirty(&self) -> Result<Vec<Observation>>;

    /// Count stored observations
    async fn count(&self) -> Result<usize>;
}

/// libSQL implementation of `ObservationRepository`
pub struct LibSqlObservationRepository<'a> {
    conn: &'a Connection,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Insert,
    Update,
    UpdateClean,
}

const OBSERVATION_COLUMNS: &str = "id, remote_id, url, user_id, device_id, last_modified, \
     timestamp, dirty, state, geometry";

impl<'a> LibSqlObservationRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Run `write_rows` inside a transaction; `false` means nothing was written
    async fn write(&self, observation: &Observation, mode: WriteMode) -> Result<bool> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        match self.write_rows(observation, mode).await {
            Ok(written) => {
                if let Err(e) = self.conn.execute("COMMIT", ()).await {
                    self.conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
                Ok(written)
            }
            Err(e) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                Err(e)
            }
        }
    }

    async fn write_rows(&self, observation: &Observation, mode: WriteMode) -> Result<bool> {
        let geometry = serde_json::to_string(&observation.geometry)?;
        let id = observation.id.as_str();

        if mode == WriteMode::Insert {
            self.conn
                .execute(
                    "INSERT INTO observations (id, remote_id, url, user_id, device_id, last_modified, timestamp, dirty, state, geometry)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        id.as_str(),
                        observation.remote_id.as_deref(),
                        observation.url.as_deref(),
                        observation.user_id.as_deref(),
                        observation.device_id.as_deref(),
                        observation.last_modified,
                        observation.timestamp,
                        i64::from(observation.dirty),
                        observation.state.as_str(),
                        geometry.as_str()
                    ],
                )
                .await?;
        } else {
            let sql = if mode == WriteMode::UpdateClean {
                "UPDATE observations
                 SET remote_id = ?, url = ?, user_id = ?, device_id = ?, last_modified = ?,
                     timestamp = ?, dirty = ?, state = ?, geometry = ?
                 WHERE id = ? AND dirty = 0"
            } else {
                "UPDATE observations
                 SET remote_id = ?, url = ?, user_id = ?, device_id = ?, last_modified = ?,
                     timestamp = ?, dirty = ?, state = ?, geometry = ?
                 WHERE id = ?"
            };
            let rows = self
                .conn
                .execute(
                    sql,
                    params![
                        observation.remote_id.as_deref(),
                        observation.url.as_deref(),
                        observation.user_id.as_deref(),
                        observation.device_id.as_deref(),
                        observation.last_modified,
                        observation.timestamp,
                        i64::from(observation.dirty),
                        observation.state.as_str(),
                        geometry.as_str(),
                        id.as_str()
                    ],
                )
                .await?;

            if rows == 0 {
                if mode == WriteMode::UpdateClean && self.exists(&id).await? {
                    return Ok(false);
                }
                return Err(Error::NotFound(id));
            }

            self.conn
                .execute(
                    "DELETE FROM observation_properties WHERE observation_id = ?",
                    [id.as_str()],
                )
                .await?;
            self.conn
                .execute(
                    "DELETE FROM attachments WHERE observation_id = ?",
                    [id.as_str()],
                )
                .await?;
        }

        for (key, value) in &observation.properties {
            self.conn
                .execute(
                    "INSERT INTO observation_properties (observation_id, key, value) VALUES (?, ?, ?)",
                    params![id.as_str(), key.as_str(), value.as_str()],
                )
                .await?;
        }

        for (position, attachment) in observation.attachments.iter().enumerate() {
            self.conn
                .execute(
                    "INSERT INTO attachments (id, observation_id, position, remote_id, content_type, name, size, remote_path, url, local_path)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        attachment.id.as_str(),
                        id.as_str(),
                        i64::try_from(position).unwrap_or(i64::MAX),
                        attachment.remote_id.as_deref(),
                        attachment.content_type.as_str(),
                        attachment.name.as_str(),
                        attachment.size,
                        attachment.remote_path.as_deref(),
                        attachment.url.as_deref(),
                        attachment.local_path.as_deref()
                    ],
                )
                .await?;
        }

        Ok(true)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM observations WHERE id = ?", [id])
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Parse the observation row itself; children are loaded separately
    fn parse_observation(row: &Row) -> Result<Observation> {
        let id: String = row.get(0)?;
        let state: String = row.get(8)?;
        let geometry: String = row.get(9)?;

        Ok(Observation {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid observation ID: {id}")))?,
            remote_id: row.get(1)?,
            url: row.get(2)?,
            user_id: row.get(3)?,
            device_id: row.get(4)?,
            last_modified: row.get(5)?,
            timestamp: row.get(6)?,
            dirty: row.get::<i64>(7)? != 0,
            state: state.parse::<ObservationState>()?,
            geometry: serde_json::from_str::<Geometry>(&geometry)?,
            properties: BTreeMap::new(),
            attachments: Vec::new(),
        })
    }

    fn parse_attachment(row: &Row) -> Result<Attachment> {
        let id: String = row.get(0)?;
        Ok(Attachment {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid attachment ID: {id}")))?,
            remote_id: row.get(1)?,
            content_type: row.get(2)?,
            name: row.get(3)?,
            size: row.get(4)?,
            remote_path: row.get(5)?,
            url: row.get(6)?,
            local_path: row.get(7)?,
        })
    }

    /// Attach properties and attachments to a parsed observation
    async fn load_children(&self, mut observation: Observation) -> Result<Observation> {
        let id = observation.id.as_str();

        let mut rows = self
            .conn
            .query(
                "SELECT key, value FROM observation_properties WHERE observation_id = ?",
                [id.as_str()],
            )
            .await?;
        while let Some(row) = rows.next().await? {
            observation
                .properties
                .insert(row.get::<String>(0)?, row.get::<String>(1)?);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT id, remote_id, content_type, name, size, remote_path, url, local_path
                 FROM attachments
                 WHERE observation_id = ?
                 ORDER BY position ASC",
                [id.as_str()],
            )
            .await?;
        while let Some(row) = rows.next().await? {
            observation.attachments.push(Self::parse_attachment(&row)?);
        }

        Ok(observation)
    }

    async fn query_one(&self, sql: &str, key: &str) -> Result<Option<Observation>> {
        let mut rows = self.conn.query(sql, [key]).await?;
        match rows.next().await? {
            Some(row) => {
                let observation = Self::parse_observation(&row)?;
                Ok(Some(self.load_children(observation).await?))
            }
            None => Ok(None),
        }
    }

    async fn collect(&self, mut rows: libsql::Rows) -> Result<Vec<Observation>> {
        let mut parsed = Vec::new();
        while let Some(row) = rows.next().await? {
            parsed.push(Self::parse_observation(&row)?);
        }

        let mut observations = Vec::with_capacity(parsed.len());
        for observation in parsed {
            observations.push(self.load_children(observation).await?);
        }
        Ok(observations)
    }
}

impl ObservationRepository for LibSqlObservationRepository<'_> {
    async fn create(&self, observation: &Observation) -> Result<Observation> {
        self.write(observation, WriteMode::Insert).await?;
        Ok(observation.clone())
    }

    async fn get(&self, id: &ObservationId) -> Result<Option<Observation>> {
        let sql = format!("SELECT {OBSERVATION_COLUMNS} FROM observations WHERE id = ?");
        self.query_one(&sql, &id.as_str()).await
    }

    async fn read_by_remote_id(&self, remote_id: &str) -> Result<Option<Observation>> {
        let sql = format!("SELECT {OBSERVATION_COLUMNS} FROM observations WHERE remote_id = ?");
        self.query_one(&sql, remote_id).await
    }

    async fn update(&self, observation: &Observation) -> Result<Observation> {
        self.write(observation, WriteMode::Update).await?;
        self.get(&observation.id)
            .await?
            .ok_or_else(|| Error::NotFound(observation.id.to_string()))
    }

    async fn update_if_clean(&self, observation: &Observation) -> Result<bool> {
        self.write(observation, WriteMode::UpdateClean).await
    }

    async fn delete(&self, id: &ObservationId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM observations WHERE id = ?", [id.as_str()])
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Observation>> {
        let sql = format!(
            "SELECT {OBSERVATION_COLUMNS}
             FROM observations
             ORDER BY timestamp DESC, id DESC
             LIMIT ? OFFSET ?"
        );
        let rows = self
            .conn
            .query(
                &sql,
                params![
                    i64::try_from(limit).unwrap_or(i64::MAX),
                    i64::try_from(offset).unwrap_or(i64::MAX)
                ],
            )
            .await?;
        self.collect(rows).await
    }

    async fn list_dirty(&self) -> Result<Vec<Observation>> {
        let sql = format!(
            "SELECT {OBSERVATION_COLUMNS} FROM observations WHERE dirty = 1 ORDER BY id ASC"
        );
        let rows = self.conn.query(&sql, ()).await?;
        self.collect(rows).await
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM observations", ())
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
