//! SQL helpers shared by the repository implementations.

use crate::db::migrations::latest_version;
use crate::model::vote::{TargetKind, UserId};
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

/// Rejects connections that did not go through `open_db*`.
pub(crate) fn ensure_schema_ready(conn: &Connection) -> RepoResult<()> {
    let actual_version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    let expected_version = latest_version();
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

/// Runs `f` atomically.
///
/// Inside a caller-owned transaction the caller's transaction is the unit;
/// otherwise an `IMMEDIATE` transaction is opened and committed here.
pub(crate) fn write_scope<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> RepoResult<T>,
) -> RepoResult<T> {
    if !conn.is_autocommit() {
        return f(conn);
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_user_id(value: &str, column: &str) -> RepoResult<UserId> {
    parse_uuid(value, column)
}

pub(crate) fn parse_target_kind(value: &str, column: &str) -> RepoResult<TargetKind> {
    value
        .parse::<TargetKind>()
        .map_err(|_| RepoError::InvalidData(format!("invalid target kind `{value}` in {column}")))
}

/// Converts a stored counter, rejecting negative values.
pub(crate) fn read_count(value: i64, column: &str) -> RepoResult<u64> {
    u64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("negative counter `{value}` in {column}")))
}
