//! Vote and reputation consistency engine.
//! This crate owns every invariant on vote records, tallies and aura.

pub mod client;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use client::local::LocalTransport;
pub use client::mirror::{PendingVote, ReconcileError, VoteAction, VoteMirror, VoteTransport};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::content::{Article, Opinion, User};
pub use model::vote::{Choice, Side, Tally, TargetId, TargetKind, TargetRef, Transition, UserId, VoteKey};
pub use repo::error::{RepoError, RepoResult};
pub use service::vote_service::{
    ArticleTally, CoordinatorConfig, OpinionTally, VoteCoordinator, VoteError, VoteOutcome,
    VoteRequest,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
