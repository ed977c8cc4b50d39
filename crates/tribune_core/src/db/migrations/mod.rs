//! Schema versioning for the vote store.
//!
//! # Responsibility
//! - Keep the ordered list of schema steps compiled into this binary.
//! - Bring a connection up to the newest step under one write lock.
//!
//! # Invariants
//! - Step versions start at 1 and increase by exactly one.
//! - `PRAGMA user_version` always names the last step applied.
//! - A database newer than this binary is refused, never downgraded.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, TransactionBehavior};

#[derive(Debug, Clone, Copy)]
struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "content",
        sql: include_str!("0001_content.sql"),
    },
    Step {
        version: 2,
        name: "votes",
        sql: include_str!("0002_votes.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Applies all pending migrations on the provided connection.
///
/// The version is read again after taking the write lock, so a second
/// process opening the same fresh file waits and then finds nothing to do.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    if ensure_supported(read_version(conn)?)? == latest_version() {
        return Ok(());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let from = ensure_supported(read_version(&tx)?)?;
    for step in STEPS.iter().filter(|step| step.version > from) {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            step.version, step.name
        );
    }
    tx.commit()?;

    Ok(())
}

fn ensure_supported(version: u32) -> DbResult<u32> {
    let latest = latest_version();
    if version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: version,
            latest_supported: latest,
        });
    }
    Ok(version)
}

fn read_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
