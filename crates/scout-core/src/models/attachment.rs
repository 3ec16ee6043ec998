//! Attachment model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for an attachment, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentId(Uuid);

impl AttachmentId {
    /// Create a new unique attachment ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID.
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for AttachmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AttachmentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Attachment descriptor as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAttachment {
    pub remote_id: String,
    pub content_type: String,
    pub name: String,
    /// Size in bytes
    pub size: i64,
    /// Server-relative storage path
    pub remote_path: Option<String>,
    pub url: Option<String>,
}

/// Attachment descriptor owned by exactly one observation.
///
/// Byte transfer is handled elsewhere; `local_path` is set once the file has
/// been downloaded and survives remote refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Unique attachment identifier.
    pub id: AttachmentId,
    /// Server identifier, `None` until uploaded.
    pub remote_id: Option<String>,
    /// Content MIME type.
    pub content_type: String,
    /// Original file name.
    pub name: String,
    /// Attachment size in bytes.
    pub size: i64,
    /// Server-relative storage path.
    pub remote_path: Option<String>,
    /// Download URL.
    pub url: Option<String>,
    /// Path of the downloaded file on this device.
    pub local_path: Option<String>,
}

impl Attachment {
    /// Build a local descriptor for a newly seen remote attachment.
    #[must_use]
    pub fn from_remote(remote: &RemoteAttachment) -> Self {
        Self {
            id: AttachmentId::new(),
            remote_id: Some(remote.remote_id.clone()),
            content_type: remote.content_type.clone(),
            name: remote.name.clone(),
            size: remote.size,
            remote_path: remote.remote_path.clone(),
            url: remote.url.clone(),
            local_path: None,
        }
    }

    /// Refresh server-owned fields, keeping the local id and file path.
    pub fn apply_remote(&mut self, remote: &RemoteAttachment) {
        self.remote_id = Some(remote.remote_id.clone());
        self.content_type.clone_from(&remote.content_type);
        self.name.clone_from(&remote.name);
        self.size = remote.size;
        self.remote_path.clone_from(&remote.remote_path);
        self.url.clone_from(&remote.url);
    }

    /// Whether the server-owned fields equal the remote descriptor.
    #[must_use]
    pub fn matches_remote(&self, remote: &RemoteAttachment) -> bool {
        self.remote_id.as_deref() == Some(remote.remote_id.as_str())
            && self.content_type == remote.content_type
            && self.name == remote.name
            && self.size == remote.size
            && self.remote_path == remote.remote_path
            && self.url == remote.url
    }
}
