//! Vote transaction coordinator.
//!
//! # Responsibility
//! - Single entry point for casting, retracting and reading votes.
//! - Enforce one active vote per user per target and switch semantics.
//! - Commit vote record, tally and aura changes as one transaction.
//!
//! # Invariants
//! - Operations for the same `(user, target)` never interleave: a second
//!   caller waits at most `lock_timeout` and then fails with `Conflict`.
//! - Any failure after the first write rolls the whole transaction back.
//! - The returned outcome is read inside the committing transaction and is
//!   the authoritative state for clients.

use crate::db::{DbError, DEFAULT_BUSY_TIMEOUT};
use crate::model::vote::{
    Choice, Tally, TargetId, TargetKind, TargetRef, Transition, UserId, VoteKey,
};
use crate::repo::content_repo::{ContentStore, SqliteContentStore};
use crate::repo::error::RepoError;
use crate::repo::tally_repo::{SqliteTallyStore, TallyStore};
use crate::repo::user_repo::{SqliteUserDirectory, UserDirectory};
use crate::repo::vote_repo::{SqliteVoteRecordStore, VoteRecordStore};
use crate::service::in_flight::InFlightVotes;
use crate::service::reputation::{OpinionVoteChange, ReputationPropagator};
use log::{info, warn};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// Wire request: `{targetKind, targetId, choice}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub target_kind: TargetKind,
    pub target_id: TargetId,
    pub choice: Choice,
}

impl VoteRequest {
    pub fn new(target: TargetRef, choice: Choice) -> Self {
        Self {
            target_kind: target.kind,
            target_id: target.id,
            choice,
        }
    }

    pub fn target(&self) -> TargetRef {
        TargetRef {
            kind: self.target_kind,
            id: self.target_id,
        }
    }
}

/// Authoritative article counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleTally {
    pub votes_for: u64,
    pub votes_against: u64,
}

/// Authoritative opinion counters plus the author's aura.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpinionTally {
    pub likes: u64,
    pub dislikes: u64,
    pub author_aura: i64,
}

/// Wire response: `{votesFor, votesAgainst}` or `{likes, dislikes, authorAura}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VoteOutcome {
    Article(ArticleTally),
    Opinion(OpinionTally),
}

impl VoteOutcome {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Article(_) => TargetKind::Article,
            Self::Opinion(_) => TargetKind::Opinion,
        }
    }

    /// Kind-agnostic counters.
    pub fn tally(&self) -> Tally {
        match self {
            Self::Article(tally) => Tally::new(tally.votes_for, tally.votes_against),
            Self::Opinion(tally) => Tally::new(tally.likes, tally.dislikes),
        }
    }

    /// Author aura, for opinion outcomes only.
    pub fn author_aura(&self) -> Option<i64> {
        match self {
            Self::Article(_) => None,
            Self::Opinion(tally) => Some(tally.author_aura),
        }
    }
}

/// Vote operation failure taxonomy.
#[derive(Debug)]
pub enum VoteError {
    /// No caller identity, or an identity the user directory does not know.
    Unauthorized,
    /// Target does not exist.
    NotFound(TargetRef),
    /// Another operation on the same key is in flight, or storage is locked.
    Conflict(VoteKey),
    /// Storage unavailable.
    TransientIo(RepoError),
    /// Choice does not belong to the target kind.
    InvalidChoice { kind: TargetKind, choice: Choice },
    /// Persisted state failed decoding or consistency checks.
    InvalidData(RepoError),
}

impl VoteError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::TransientIo(_) => "transient_io",
            Self::InvalidChoice { .. } => "invalid_choice",
            Self::InvalidData(_) => "invalid_data",
        }
    }

    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::TransientIo(_))
    }

    fn from_repo(err: RepoError, key: &VoteKey) -> Self {
        match err {
            RepoError::TargetNotFound(target) => Self::NotFound(target),
            RepoError::UserNotFound(user_id) if user_id == key.user_id => Self::Unauthorized,
            RepoError::Db(db) if db.is_busy() => Self::Conflict(*key),
            err @ (RepoError::Db(_) | RepoError::UninitializedConnection { .. }) => {
                Self::TransientIo(err)
            }
            err => Self::InvalidData(err),
        }
    }

    fn from_sqlite(err: rusqlite::Error, key: &VoteKey) -> Self {
        Self::from_repo(RepoError::Db(DbError::Sqlite(err)), key)
    }
}

impl Display for VoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "caller is not authenticated"),
            Self::NotFound(target) => write!(f, "vote target not found: {target}"),
            Self::Conflict(key) => write!(f, "another vote is in flight for {key}"),
            Self::TransientIo(err) => write!(f, "vote storage unavailable: {err}"),
            Self::InvalidChoice { kind, choice } => {
                write!(f, "choice `{choice}` is not valid for {kind} targets")
            }
            Self::InvalidData(err) => write!(f, "{err}"),
        }
    }
}

impl Error for VoteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TransientIo(err) | Self::InvalidData(err) => Some(err),
            _ => None,
        }
    }
}

/// Lock waits applied by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Wait for an in-flight operation on the same key. Zero fails fast.
    pub lock_timeout: Duration,
    /// Wait for another connection's SQLite write lock.
    pub busy_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::ZERO,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// Entry point for vote operations.
///
/// Shared across threads; each caller brings its own connection so votes
/// on different keys proceed independently.
#[derive(Debug, Default)]
pub struct VoteCoordinator {
    config: CoordinatorConfig,
    in_flight: InFlightVotes,
}

impl VoteCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            in_flight: InFlightVotes::new(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Whether an operation for `key` is currently running.
    pub fn is_in_flight(&self, key: &VoteKey) -> bool {
        self.in_flight.is_active(key)
    }

    /// Casts `request.choice` for `caller`.
    ///
    /// # Contract
    /// - Repeating the current choice is a no-op, not a toggle-off.
    /// - Switching sides moves exactly one unit between counters.
    /// - Opinion votes adjust the author's aura unless `caller` is the author.
    ///
    /// # Errors
    /// `Unauthorized`, `NotFound`, `Conflict`, `TransientIo`,
    /// `InvalidChoice`, `InvalidData`.
    pub fn cast_vote(
        &self,
        conn: &mut Connection,
        caller: Option<UserId>,
        request: &VoteRequest,
    ) -> Result<VoteOutcome, VoteError> {
        let target = request.target();
        if caller.is_none() {
            return Err(VoteError::Unauthorized);
        }
        if request.choice.kind() != target.kind {
            return Err(VoteError::InvalidChoice {
                kind: target.kind,
                choice: request.choice,
            });
        }
        self.run("vote_cast", conn, caller, target, Some(request.choice))
    }

    /// Withdraws the caller's vote on `target`.
    ///
    /// Retracting when no vote exists is a no-op.
    pub fn retract_vote(
        &self,
        conn: &mut Connection,
        caller: Option<UserId>,
        target: TargetRef,
    ) -> Result<VoteOutcome, VoteError> {
        self.run("vote_retract", conn, caller, target, None)
    }

    /// Reads the current authoritative outcome without mutating.
    pub fn snapshot(&self, conn: &Connection, target: TargetRef) -> Result<VoteOutcome, VoteError> {
        let key = VoteKey::new(UserId::nil(), target);
        read_outcome(conn, &target).map_err(|err| VoteError::from_repo(err, &key))
    }

    /// Lists the caller's current choices, for client mirror hydration.
    pub fn votes_for_user(
        &self,
        conn: &Connection,
        caller: Option<UserId>,
    ) -> Result<Vec<(TargetRef, Choice)>, VoteError> {
        let user_id = caller.ok_or(VoteError::Unauthorized)?;
        let key = VoteKey::new(user_id, TargetRef::article(TargetId::nil()));
        let load = || -> Result<_, RepoError> {
            SqliteUserDirectory::try_new(conn)?.aura(user_id)?;
            SqliteVoteRecordStore::try_new(conn)?.list_votes_for_user(user_id)
        };
        load().map_err(|err| VoteError::from_repo(err, &key))
    }

    fn run(
        &self,
        event: &'static str,
        conn: &mut Connection,
        caller: Option<UserId>,
        target: TargetRef,
        next: Option<Choice>,
    ) -> Result<VoteOutcome, VoteError> {
        let started_at = Instant::now();
        let result = self.transact(conn, caller, target, next);

        match &result {
            Ok((_, transition)) => info!(
                "event={event} module=vote status={} kind={} transition={} duration_ms={}",
                if transition.is_noop() { "noop" } else { "ok" },
                target.kind,
                transition.label(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event={event} module=vote status=error kind={} error_code={} duration_ms={} error={err}",
                target.kind,
                err.code(),
                started_at.elapsed().as_millis()
            ),
        }

        result.map(|(outcome, _)| outcome)
    }

    fn transact(
        &self,
        conn: &mut Connection,
        caller: Option<UserId>,
        target: TargetRef,
        next: Option<Choice>,
    ) -> Result<(VoteOutcome, Transition), VoteError> {
        let user_id = caller.ok_or(VoteError::Unauthorized)?;
        let key = VoteKey::new(user_id, target);

        let _guard = self
            .in_flight
            .try_acquire(key, self.config.lock_timeout)
            .ok_or(VoteError::Conflict(key))?;

        conn.busy_timeout(self.config.busy_timeout)
            .map_err(|err| VoteError::from_sqlite(err, &key))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| VoteError::from_sqlite(err, &key))?;

        let applied = apply_in_tx(&tx, &key, next).map_err(|err| VoteError::from_repo(err, &key))?;
        tx.commit().map_err(|err| VoteError::from_sqlite(err, &key))?;
        Ok(applied)
    }
}

fn apply_in_tx(
    conn: &Connection,
    key: &VoteKey,
    next: Option<Choice>,
) -> Result<(VoteOutcome, Transition), RepoError> {
    let users = SqliteUserDirectory::try_new(conn)?;
    users.aura(key.user_id)?;

    let content = SqliteContentStore::try_new(conn)?;
    let author = match key.target.kind {
        TargetKind::Opinion => Some(
            content
                .opinion_author(key.target.id)?
                .ok_or(RepoError::TargetNotFound(key.target))?,
        ),
        TargetKind::Article => {
            if !content.target_exists(&key.target)? {
                return Err(RepoError::TargetNotFound(key.target));
            }
            None
        }
    };

    let records = SqliteVoteRecordStore::try_new(conn)?;
    let previous = records.get_vote(key)?;
    let transition = Transition::between(previous, next);
    if transition.is_noop() {
        return Ok((read_outcome(conn, &key.target)?, transition));
    }

    let replaced = match next {
        Some(choice) => records.set_vote(key, choice)?,
        None => records.clear_vote(key)?,
    };
    if replaced != previous {
        return Err(RepoError::InvalidData(format!(
            "vote record for {key} changed inside its own transaction"
        )));
    }

    let tallies = SqliteTallyStore::try_new(conn)?;
    let tally = tallies.apply_transition(&key.target, key.user_id, transition)?;

    let outcome = match author {
        Some(author) => {
            let update = ReputationPropagator::new(users).propagate(&OpinionVoteChange {
                voter: key.user_id,
                author,
                transition,
            })?;
            VoteOutcome::Opinion(OpinionTally {
                likes: tally.positive,
                dislikes: tally.negative,
                author_aura: update.aura,
            })
        }
        None => VoteOutcome::Article(ArticleTally {
            votes_for: tally.positive,
            votes_against: tally.negative,
        }),
    };

    Ok((outcome, transition))
}

fn read_outcome(conn: &Connection, target: &TargetRef) -> Result<VoteOutcome, RepoError> {
    let tally = SqliteTallyStore::try_new(conn)?.tally(target)?;
    match target.kind {
        TargetKind::Article => Ok(VoteOutcome::Article(ArticleTally {
            votes_for: tally.positive,
            votes_against: tally.negative,
        })),
        TargetKind::Opinion => {
            let author = SqliteContentStore::try_new(conn)?
                .opinion_author(target.id)?
                .ok_or(RepoError::TargetNotFound(*target))?;
            let author_aura = SqliteUserDirectory::try_new(conn)?.aura(author)?;
            Ok(VoteOutcome::Opinion(OpinionTally {
                likes: tally.positive,
                dislikes: tally.negative,
                author_aura,
            }))
        }
    }
}
