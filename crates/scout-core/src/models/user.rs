//! User model

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a fetched user profile stays fresh before it is re-fetched.
pub const USER_STALENESS_WINDOW: Duration = Duration::from_secs(6 * 60 * 60);

/// A remote user profile cached locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Remote user identifier
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Last successful remote refresh (Unix ms)
    pub fetched_date: i64,
}

impl User {
    /// Whether the profile was fetched longer ago than the staleness window.
    #[must_use]
    pub fn is_stale(&self, now_ms: i64) -> bool {
        let window_ms = i64::try_from(USER_STALENESS_WINDOW.as_millis()).unwrap_or(i64::MAX);
        now_ms > self.fetched_date.saturating_add(window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(fetched_date: i64) -> User {
        User {
            id: "u-1".to_string(),
            username: "field.tech".to_string(),
            display_name: None,
            email: None,
            phone: None,
            fetched_date,
        }
    }

    #[test]
    fn test_fresh_profile_is_not_stale() {
        let now = 100_000_000;
        assert!(!user(now - 60_000).is_stale(now));
    }

    #[test]
    fn test_profile_older_than_six_hours_is_stale() {
        let six_hours = 6 * 60 * 60 * 1000;
        let now = 100_000_000;
        assert!(!user(now - six_hours).is_stale(now));
        assert!(user(now - six_hours - 1).is_stale(now));
    }
}
