//! Repository error shared by every SQLite-backed store.

use crate::db::DbError;
use crate::model::vote::{Side, TargetRef, UserId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence error with semantic variants on top of DB transport errors.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Vote target does not exist in the content store.
    TargetNotFound(TargetRef),
    /// User does not exist in the user directory.
    UserNotFound(UserId),
    /// Connection schema is not at the version this binary expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Cached counters and voter sets disagree for one side of a target.
    TallyDrift { target: TargetRef, side: Side },
    /// Persisted row cannot be decoded into the domain model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::TargetNotFound(target) => write!(f, "vote target not found: {target}"),
            Self::UserNotFound(id) => write!(f, "user not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "vote repositories require schema version {expected_version}, got {actual_version}"
            ),
            Self::TallyDrift { target, side } => write!(
                f,
                "tally drift on {target}: {} counter disagrees with voter set",
                side.as_str()
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
