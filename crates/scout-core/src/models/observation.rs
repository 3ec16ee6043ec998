//! Observation model

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

use super::attachment::{Attachment, RemoteAttachment};
use crate::error::Error;
use crate::util::unix_millis_now;

/// A unique local identifier for an observation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObservationId(Uuid);

impl ObservationId {
    /// Create a new unique observation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ObservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObservationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Server-side lifecycle state of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObservationState {
    /// Visible, editable observation
    #[default]
    Active,
    /// Closed out but still visible
    Complete,
    /// Tombstoned on the server
    Archive,
}

impl ObservationState {
    /// Canonical upper-case name used on the wire and in storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Complete => "COMPLETE",
            Self::Archive => "ARCHIVE",
        }
    }

    #[must_use]
    pub const fn is_archived(self) -> bool {
        matches!(self, Self::Archive)
    }
}

impl fmt::Display for ObservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObservationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "COMPLETE" => Ok(Self::Complete),
            "ARCHIVE" => Ok(Self::Archive),
            other => Err(Error::InvalidInput(format!(
                "unknown observation state '{other}'"
            ))),
        }
    }
}

/// A GeoJSON position: `[longitude, latitude]` with optional altitude.
pub type Position = Vec<f64>;

/// Observation geometry, serialized in GeoJSON shape
/// (`{"type": "Point", "coordinates": [...]}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    Polygon(Vec<Vec<Position>>),
}

impl Geometry {
    /// Point geometry from longitude/latitude
    #[must_use]
    pub fn point(longitude: f64, latitude: f64) -> Self {
        Self::Point(vec![longitude, latitude])
    }

    /// Check that every position carries at least longitude and latitude
    /// and that rings/lines have enough vertices to be meaningful.
    pub fn validate(&self) -> Result<(), String> {
        fn check(position: &Position) -> Result<(), String> {
            if position.len() < 2 {
                return Err(format!(
                    "position needs at least 2 coordinates, got {}",
                    position.len()
                ));
            }
            if position.iter().any(|value| !value.is_finite()) {
                return Err("position contains a non-finite coordinate".to_string());
            }
            Ok(())
        }

        match self {
            Self::Point(position) => check(position),
            Self::LineString(positions) => {
                if positions.len() < 2 {
                    return Err("line string needs at least 2 positions".to_string());
                }
                positions.iter().try_for_each(check)
            }
            Self::Polygon(rings) => {
                if rings.is_empty() {
                    return Err("polygon needs at least one ring".to_string());
                }
                for ring in rings {
                    if ring.len() < 4 {
                        return Err("polygon ring needs at least 4 positions".to_string());
                    }
                    ring.iter().try_for_each(check)?;
                }
                Ok(())
            }
        }
    }
}

/// An observation as reported by the server in a fetch snapshot.
///
/// Always carries a remote id; it never carries a local id or dirty flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteObservation {
    pub remote_id: String,
    pub url: Option<String>,
    /// Author's remote user id, `None` when unknown
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    /// Server modification time (Unix ms), `None` when the server omits it
    pub last_modified: Option<i64>,
    /// Time the observation describes (Unix ms), `None` when omitted
    pub timestamp: Option<i64>,
    pub state: ObservationState,
    pub geometry: Geometry,
    pub properties: BTreeMap<String, String>,
    pub attachments: Vec<RemoteAttachment>,
}

/// A locally stored observation.
///
/// Equality, hashing, and ordering consider only `(id, remote_id)`;
/// use [`Observation::matches_remote`] to compare synced content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Local identifier, generated once and never reused
    pub id: ObservationId,
    /// Server identifier, `None` until the observation is pushed
    pub remote_id: Option<String>,
    pub url: Option<String>,
    /// Author's remote user id, `None` when unknown
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    /// Server modification time (Unix ms); 0 means never synchronized
    pub last_modified: i64,
    /// Time the observation describes (Unix ms)
    pub timestamp: i64,
    /// Local edits not yet accepted by the server
    pub dirty: bool,
    pub state: ObservationState,
    pub geometry: Geometry,
    pub properties: BTreeMap<String, String>,
    pub attachments: Vec<Attachment>,
}

impl Observation {
    /// Create an observation from a local user action.
    ///
    /// The record starts dirty, without a remote id, and never synchronized.
    #[must_use]
    pub fn new_local(
        geometry: Geometry,
        properties: BTreeMap<String, String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: ObservationId::new(),
            remote_id: None,
            url: None,
            user_id: None,
            device_id: None,
            last_modified: 0,
            timestamp,
            dirty: true,
            state: ObservationState::Active,
            geometry,
            properties,
            attachments: Vec::new(),
        }
    }

    /// Create a clean local copy of a remote record on first sight.
    ///
    /// Times the server omitted are stamped with the creation time.
    #[must_use]
    pub fn from_remote(remote: &RemoteObservation) -> Self {
        Self::from_remote_at(remote, unix_millis_now())
    }

    /// [`Observation::from_remote`] with an explicit creation time.
    #[must_use]
    pub fn from_remote_at(remote: &RemoteObservation, created_ms: i64) -> Self {
        let last_modified = remote.last_modified.unwrap_or(created_ms);
        Self {
            id: ObservationId::new(),
            remote_id: Some(remote.remote_id.clone()),
            url: remote.url.clone(),
            user_id: remote.user_id.clone(),
            device_id: remote.device_id.clone(),
            last_modified,
            timestamp: remote.timestamp.unwrap_or(last_modified),
            dirty: false,
            state: remote.state,
            geometry: remote.geometry.clone(),
            properties: remote.properties.clone(),
            attachments: remote
                .attachments
                .iter()
                .map(Attachment::from_remote)
                .collect(),
        }
    }

    /// Overwrite the synced fields with the remote record's values.
    ///
    /// The local id and dirty flag are preserved, as are times the remote
    /// record does not carry. Attachments already known
    /// by remote id keep their local id and downloaded file path.
    pub fn apply_remote(&mut self, remote: &RemoteObservation) {
        self.remote_id = Some(remote.remote_id.clone());
        self.url.clone_from(&remote.url);
        self.user_id.clone_from(&remote.user_id);
        self.device_id.clone_from(&remote.device_id);
        if let Some(last_modified) = remote.last_modified {
            self.last_modified = last_modified;
        }
        if let Some(timestamp) = remote.timestamp {
            self.timestamp = timestamp;
        }
        self.state = remote.state;
        self.geometry = remote.geometry.clone();
        self.properties.clone_from(&remote.properties);

        let mut previous = std::mem::take(&mut self.attachments);
        self.attachments = remote
            .attachments
            .iter()
            .map(|incoming| {
                let known = previous
                    .iter()
                    .position(|existing| {
                        existing.remote_id.as_deref() == Some(incoming.remote_id.as_str())
                    });
                match known {
                    Some(index) => {
                        let mut existing = previous.swap_remove(index);
                        existing.apply_remote(incoming);
                        existing
                    }
                    None => Attachment::from_remote(incoming),
                }
            })
            .collect();
    }

    /// Whether applying `remote` would leave every synced field unchanged.
    #[must_use]
    pub fn matches_remote(&self, remote: &RemoteObservation) -> bool {
        self.remote_id.as_deref() == Some(remote.remote_id.as_str())
            && self.url == remote.url
            && self.user_id == remote.user_id
            && self.device_id == remote.device_id
            && remote
                .last_modified
                .is_none_or(|last_modified| self.last_modified == last_modified)
            && remote
                .timestamp
                .is_none_or(|timestamp| self.timestamp == timestamp)
            && self.state == remote.state
            && self.geometry == remote.geometry
            && self.properties == remote.properties
            && self.attachments.len() == remote.attachments.len()
            && self
                .attachments
                .iter()
                .zip(&remote.attachments)
                .all(|(local, incoming)| local.matches_remote(incoming))
    }

    /// Merge properties by key; incoming values win.
    pub fn add_properties<I, K, V>(&mut self, properties: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in properties {
            self.properties.insert(key.into(), value.into());
        }
    }

    /// Case-sensitive property lookup
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Whether the record has never been confirmed by the server
    #[must_use]
    pub const fn is_unsynchronized(&self) -> bool {
        self.last_modified == 0
    }
}

impl PartialEq for Observation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.remote_id == other.remote_id
    }
}

impl Eq for Observation {}

impl Hash for Observation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.remote_id.hash(state);
    }
}

impl PartialOrd for Observation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Observation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.remote_id.cmp(&other.remote_id))
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Observation {{ id: {}, remote_id: {}, state: {}, dirty: {}, last_modified: {}, timestamp: {}, user_id: {}, properties: {}, attachments: {} }}",
            self.id,
            self.remote_id.as_deref().unwrap_or("-"),
            self.state,
            self.dirty,
            self.last_modified,
            self.timestamp,
            self.user_id.as_deref().unwrap_or("-"),
            self.properties.len(),
            self.attachments.len(),
        )
    }
}
