//! VoteRecord store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist each user's current choice per target under a `(user, target)`
//!   composite key.
//! - Report the previous choice on every write so callers can derive the
//!   exact transition.
//!
//! # Invariants
//! - At most one record per `VoteKey` (table primary key).
//! - Read-previous-then-write runs inside one write transaction.
//! - Writes for targets that do not exist fail with `TargetNotFound`.

use crate::model::vote::{Choice, TargetKind, TargetRef, UserId, VoteKey};
use crate::repo::content_repo::{ContentStore, SqliteContentStore};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::sql::{ensure_schema_ready, parse_target_kind, parse_uuid, write_scope};
use rusqlite::{params, Connection, OptionalExtension};

/// Repository interface for per-user vote records.
pub trait VoteRecordStore {
    /// Returns the stored choice, or `None` when no vote was cast.
    fn get_vote(&self, key: &VoteKey) -> RepoResult<Option<Choice>>;
    /// Stores `choice` and returns the choice it replaced.
    fn set_vote(&self, key: &VoteKey, choice: Choice) -> RepoResult<Option<Choice>>;
    /// Removes the record and returns the choice it held.
    fn clear_vote(&self, key: &VoteKey) -> RepoResult<Option<Choice>>;
    /// Lists every current choice of one user, ordered by target.
    fn list_votes_for_user(&self, user_id: UserId) -> RepoResult<Vec<(TargetRef, Choice)>>;
}

/// SQLite-backed vote record store.
pub struct SqliteVoteRecordStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteVoteRecordStore<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl VoteRecordStore for SqliteVoteRecordStore<'_> {
    fn get_vote(&self, key: &VoteKey) -> RepoResult<Option<Choice>> {
        read_choice(self.conn, key)
    }

    fn set_vote(&self, key: &VoteKey, choice: Choice) -> RepoResult<Option<Choice>> {
        if choice.kind() != key.target.kind {
            return Err(RepoError::InvalidData(format!(
                "choice `{choice}` cannot be stored for {} targets",
                key.target.kind
            )));
        }

        write_scope(self.conn, |conn| {
            ensure_target_exists(conn, &key.target)?;
            let previous = read_choice(conn, key)?;
            if previous == Some(choice) {
                return Ok(previous);
            }

            conn.execute(
                "INSERT INTO vote_records (user_uuid, target_kind, target_uuid, choice)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_uuid, target_kind, target_uuid) DO UPDATE
                 SET choice = excluded.choice,
                     updated_at = (strftime('%s', 'now') * 1000);",
                params![
                    key.user_id.to_string(),
                    key.target.kind.as_str(),
                    key.target.id.to_string(),
                    choice.as_str(),
                ],
            )?;
            Ok(previous)
        })
    }

    fn clear_vote(&self, key: &VoteKey) -> RepoResult<Option<Choice>> {
        write_scope(self.conn, |conn| {
            ensure_target_exists(conn, &key.target)?;
            let previous = read_choice(conn, key)?;
            if previous.is_some() {
                conn.execute(
                    "DELETE FROM vote_records
                     WHERE user_uuid = ?1
                       AND target_kind = ?2
                       AND target_uuid = ?3;",
                    params![
                        key.user_id.to_string(),
                        key.target.kind.as_str(),
                        key.target.id.to_string(),
                    ],
                )?;
            }
            Ok(previous)
        })
    }

    fn list_votes_for_user(&self, user_id: UserId) -> RepoResult<Vec<(TargetRef, Choice)>> {
        let mut stmt = self.conn.prepare(
            "SELECT target_kind, target_uuid, choice
             FROM vote_records
             WHERE user_uuid = ?1
             ORDER BY target_kind ASC, target_uuid ASC;",
        )?;
        let mut rows = stmt.query([user_id.to_string()])?;
        let mut votes = Vec::new();
        while let Some(row) = rows.next()? {
            let kind_text: String = row.get("target_kind")?;
            let uuid_text: String = row.get("target_uuid")?;
            let choice_text: String = row.get("choice")?;
            let target = TargetRef {
                kind: parse_target_kind(&kind_text, "vote_records.target_kind")?,
                id: parse_uuid(&uuid_text, "vote_records.target_uuid")?,
            };
            votes.push((target, parse_choice(&choice_text, target.kind)?));
        }
        Ok(votes)
    }
}

fn read_choice(conn: &Connection, key: &VoteKey) -> RepoResult<Option<Choice>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT choice
             FROM vote_records
             WHERE user_uuid = ?1
               AND target_kind = ?2
               AND target_uuid = ?3;",
            params![
                key.user_id.to_string(),
                key.target.kind.as_str(),
                key.target.id.to_string(),
            ],
            |row| row.get(0),
        )
        .optional()?;

    value
        .map(|text| parse_choice(&text, key.target.kind))
        .transpose()
}

fn parse_choice(value: &str, kind: TargetKind) -> RepoResult<Choice> {
    match value.parse::<Choice>() {
        Ok(choice) if choice.kind() == kind => Ok(choice),
        _ => Err(RepoError::InvalidData(format!(
            "invalid choice `{value}` for {kind} in vote_records.choice"
        ))),
    }
}

fn ensure_target_exists(conn: &Connection, target: &TargetRef) -> RepoResult<()> {
    let content = SqliteContentStore::try_new(conn)?;
    if !content.target_exists(target)? {
        return Err(RepoError::TargetNotFound(*target));
    }
    Ok(())
}
