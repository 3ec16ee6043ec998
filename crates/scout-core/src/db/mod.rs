//! Database layer for Scout

mod connection;
mod migrations;
mod observation_repository;
mod settings_repository;
mod user_repository;

pub use connection::Database;
pub use observation_repository::{LibSqlObservationRepository, ObservationRepository};
pub use settings_repository::{
    LibSqlSettingsRepository, SettingsRepository, FETCH_ENABLED_KEY, POLL_INTERVAL_KEY,
};
pub use user_repository::{LibSqlUserRepository, UserRepository};
