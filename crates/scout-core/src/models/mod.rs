//! Data models for Scout

mod attachment;
mod observation;
mod settings;
mod user;

pub use attachment::{Attachment, AttachmentId, RemoteAttachment};
pub use observation::{
    Geometry, Observation, ObservationId, ObservationState, Position, RemoteObservation,
};
pub use settings::{SyncSettings, DEFAULT_POLL_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS};
pub use user::{User, USER_STALENESS_WINDOW};
