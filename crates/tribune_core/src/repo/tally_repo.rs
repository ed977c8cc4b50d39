//! Tally aggregation over voter sets and cached counters.
//!
//! # Responsibility
//! - Apply one vote transition to a target's voter sets and counters.
//! - Read counters, voter sets and a recount audit.
//!
//! # Invariants
//! - `tally_members` is the source of truth; `articles.votes_*` and
//!   `opinions.likes/dislikes` always equal the set sizes.
//! - A user is a member of at most one side per target.
//! - A transition that would break either invariant fails with `TallyDrift`
//!   and the enclosing transaction rolls back.

use crate::model::vote::{Side, Tally, TargetKind, TargetRef, Transition, UserId};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::sql::{ensure_schema_ready, parse_user_id, read_count, write_scope};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

/// Counters compared against a recount of the voter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TallyAudit {
    pub target: TargetRef,
    /// Counters stored on the target row.
    pub cached: Tally,
    /// Sizes of the voter sets.
    pub counted: Tally,
}

impl TallyAudit {
    pub fn is_consistent(&self) -> bool {
        self.cached == self.counted
    }
}

/// Repository interface for per-target tallies.
pub trait TallyStore {
    /// Applies `transition` for `user_id` and returns the new tally.
    fn apply_transition(
        &self,
        target: &TargetRef,
        user_id: UserId,
        transition: Transition,
    ) -> RepoResult<Tally>;
    /// Reads cached counters.
    fn tally(&self, target: &TargetRef) -> RepoResult<Tally>;
    /// Lists the members of one side, ordered by user id.
    fn voters(&self, target: &TargetRef, side: Side) -> RepoResult<Vec<UserId>>;
    /// Recounts voter sets and compares them with cached counters.
    fn audit(&self, target: &TargetRef) -> RepoResult<TallyAudit>;
}

/// SQLite-backed tally store.
pub struct SqliteTallyStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTallyStore<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

struct CounterColumns {
    table: &'static str,
    positive: &'static str,
    negative: &'static str,
}

impl CounterColumns {
    fn for_kind(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Article => Self {
                table: "articles",
                positive: "votes_for",
                negative: "votes_against",
            },
            TargetKind::Opinion => Self {
                table: "opinions",
                positive: "likes",
                negative: "dislikes",
            },
        }
    }

    fn column(&self, side: Side) -> &'static str {
        match side {
            Side::Positive => self.positive,
            Side::Negative => self.negative,
        }
    }
}

impl TallyStore for SqliteTallyStore<'_> {
    fn apply_transition(
        &self,
        target: &TargetRef,
        user_id: UserId,
        transition: Transition,
    ) -> RepoResult<Tally> {
        if transition.is_noop() {
            return self.tally(target);
        }

        write_scope(self.conn, |conn| {
            if let Some(side) = transition.previous {
                leave_side(conn, target, user_id, side)?;
            }
            if let Some(side) = transition.next {
                join_side(conn, target, user_id, side)?;
            }
            debug!(
                "event=tally_apply module=tally status=ok kind={} transition={}",
                target.kind,
                transition.label()
            );
            read_tally(conn, target)
        })
    }

    fn tally(&self, target: &TargetRef) -> RepoResult<Tally> {
        read_tally(self.conn, target)
    }

    fn voters(&self, target: &TargetRef, side: Side) -> RepoResult<Vec<UserId>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_uuid
             FROM tally_members
             WHERE target_kind = ?1
               AND target_uuid = ?2
               AND side = ?3
             ORDER BY user_uuid ASC;",
        )?;
        let mut rows = stmt.query(params![
            target.kind.as_str(),
            target.id.to_string(),
            side.as_str(),
        ])?;
        let mut voters = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            voters.push(parse_user_id(&value, "tally_members.user_uuid")?);
        }
        Ok(voters)
    }

    fn audit(&self, target: &TargetRef) -> RepoResult<TallyAudit> {
        let cached = read_tally(self.conn, target)?;
        let mut counted = Tally::default();

        let mut stmt = self.conn.prepare(
            "SELECT side, COUNT(*)
             FROM tally_members
             WHERE target_kind = ?1
               AND target_uuid = ?2
             GROUP BY side;",
        )?;
        let mut rows = stmt.query(params![target.kind.as_str(), target.id.to_string()])?;
        while let Some(row) = rows.next()? {
            let side_text: String = row.get(0)?;
            let count = read_count(row.get(1)?, "tally_members.count")?;
            match Side::parse(&side_text) {
                Some(Side::Positive) => counted.positive = count,
                Some(Side::Negative) => counted.negative = count,
                None => {
                    return Err(RepoError::InvalidData(format!(
                        "invalid side `{side_text}` in tally_members.side"
                    )));
                }
            }
        }

        Ok(TallyAudit {
            target: *target,
            cached,
            counted,
        })
    }
}

fn leave_side(conn: &Connection, target: &TargetRef, user_id: UserId, side: Side) -> RepoResult<()> {
    let removed = conn.execute(
        "DELETE FROM tally_members
         WHERE target_kind = ?1
           AND target_uuid = ?2
           AND user_uuid = ?3
           AND side = ?4;",
        params![
            target.kind.as_str(),
            target.id.to_string(),
            user_id.to_string(),
            side.as_str(),
        ],
    )?;
    if removed == 0 {
        return Err(RepoError::TallyDrift {
            target: *target,
            side,
        });
    }

    let columns = CounterColumns::for_kind(target.kind);
    let column = columns.column(side);
    let changed = conn.execute(
        &format!(
            "UPDATE {table} SET {column} = {column} - 1 WHERE uuid = ?1 AND {column} > 0;",
            table = columns.table
        ),
        [target.id.to_string()],
    )?;
    if changed == 0 {
        return Err(RepoError::TallyDrift {
            target: *target,
            side,
        });
    }
    Ok(())
}

fn join_side(conn: &Connection, target: &TargetRef, user_id: UserId, side: Side) -> RepoResult<()> {
    let inserted = conn.execute(
        "INSERT INTO tally_members (target_kind, target_uuid, user_uuid, side)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (target_kind, target_uuid, user_uuid) DO NOTHING;",
        params![
            target.kind.as_str(),
            target.id.to_string(),
            user_id.to_string(),
            side.as_str(),
        ],
    )?;
    if inserted == 0 {
        // Already a member of some side: the caller's previous choice was stale.
        return Err(RepoError::TallyDrift {
            target: *target,
            side,
        });
    }

    let columns = CounterColumns::for_kind(target.kind);
    let column = columns.column(side);
    let changed = conn.execute(
        &format!(
            "UPDATE {table} SET {column} = {column} + 1 WHERE uuid = ?1;",
            table = columns.table
        ),
        [target.id.to_string()],
    )?;
    if changed == 0 {
        return Err(RepoError::TargetNotFound(*target));
    }
    Ok(())
}

fn read_tally(conn: &Connection, target: &TargetRef) -> RepoResult<Tally> {
    let columns = CounterColumns::for_kind(target.kind);
    let counters: Option<(i64, i64)> = conn
        .query_row(
            &format!(
                "SELECT {positive}, {negative} FROM {table} WHERE uuid = ?1;",
                positive = columns.positive,
                negative = columns.negative,
                table = columns.table
            ),
            [target.id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (positive, negative) = counters.ok_or(RepoError::TargetNotFound(*target))?;
    Ok(Tally::new(
        read_count(positive, columns.positive)?,
        read_count(negative, columns.negative)?,
    ))
}
