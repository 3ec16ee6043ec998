//! scout-core - Core library for Scout
//!
//! This crate contains the observation models, the libSQL-backed local store,
//! the server client, and the background sync engine used by the Scout CLI.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Observation, ObservationId, ObservationState, RemoteObservation};
