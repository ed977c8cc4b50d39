//! User directory binding: identity lookups and the aura column.

use crate::model::content::User;
use crate::model::vote::UserId;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::sql::{ensure_schema_ready, parse_user_id};
use rusqlite::{params, Connection, OptionalExtension};

/// Repository interface for the user directory.
pub trait UserDirectory {
    fn create_user(&self, user: &User) -> RepoResult<UserId>;
    fn get_user(&self, id: UserId) -> RepoResult<Option<User>>;
    /// Current aura. Fails with `UserNotFound` for unknown ids.
    fn aura(&self, id: UserId) -> RepoResult<i64>;
    /// Adds `delta` to the user's aura and returns the new value.
    fn adjust_aura(&self, id: UserId, delta: i64) -> RepoResult<i64>;
}

/// SQLite-backed user directory.
pub struct SqliteUserDirectory<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserDirectory<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl UserDirectory for SqliteUserDirectory<'_> {
    fn create_user(&self, user: &User) -> RepoResult<UserId> {
        self.conn.execute(
            "INSERT INTO users (uuid, display_name, aura) VALUES (?1, ?2, ?3);",
            params![user.uuid.to_string(), user.display_name.as_str(), user.aura],
        )?;
        Ok(user.uuid)
    }

    fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        let row = self
            .conn
            .query_row(
                "SELECT uuid, display_name, aura FROM users WHERE uuid = ?1;",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((uuid_text, display_name, aura)) => Ok(Some(User {
                uuid: parse_user_id(&uuid_text, "users.uuid")?,
                display_name,
                aura,
            })),
            None => Ok(None),
        }
    }

    fn aura(&self, id: UserId) -> RepoResult<i64> {
        self.conn
            .query_row(
                "SELECT aura FROM users WHERE uuid = ?1;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(RepoError::UserNotFound(id))
    }

    fn adjust_aura(&self, id: UserId, delta: i64) -> RepoResult<i64> {
        self.conn
            .query_row(
                "UPDATE users
                 SET aura = aura + ?2
                 WHERE uuid = ?1
                 RETURNING aura;",
                params![id.to_string(), delta],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(RepoError::UserNotFound(id))
    }
}
