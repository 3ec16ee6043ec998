//! User profile repository implementation

use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::User;

/// Trait for cached user profile storage (async)
#[allow(async_fn_in_trait)]
pub trait UserRepository {
    /// Get a user by remote ID
    async fn get(&self, id: &str) -> Result<Option<User>>;

    /// Insert or replace a user profile
    async fn upsert(&self, user: &User) -> Result<()>;
}

/// libSQL implementation of `UserRepository`
pub struct LibSqlUserRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlUserRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_user(row: &Row) -> Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            display_name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            fetched_date: row.get(5)?,
        })
    }
}

impl UserRepository for LibSqlUserRepository<'_> {
    async fn get(&self, id: &str) -> Result<Option<User>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, username, display_name, email, phone, fetched_date FROM users WHERE id = ?",
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_user(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, user: &User) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO users (id, username, display_name, email, phone, fetched_date)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    user.id.as_str(),
                    user.username.as_str(),
                    user.display_name.as_deref(),
                    user.email.as_deref(),
                    user.phone.as_deref(),
                    user.fetched_date
                ],
            )
            .await?;
        Ok(())
    }
}
