//! In-process transport that calls the coordinator directly.

use crate::client::mirror::VoteTransport;
use crate::model::vote::{TargetRef, UserId};
use crate::service::vote_service::{VoteCoordinator, VoteError, VoteOutcome, VoteRequest};
use rusqlite::Connection;

/// Sends votes to a coordinator on the caller's connection.
pub struct LocalTransport<'a> {
    coordinator: &'a VoteCoordinator,
    conn: &'a mut Connection,
    caller: Option<UserId>,
}

impl<'a> LocalTransport<'a> {
    pub fn new(
        coordinator: &'a VoteCoordinator,
        conn: &'a mut Connection,
        caller: Option<UserId>,
    ) -> Self {
        Self {
            coordinator,
            conn,
            caller,
        }
    }
}

impl VoteTransport for LocalTransport<'_> {
    fn send(&mut self, request: &VoteRequest) -> Result<VoteOutcome, VoteError> {
        self.coordinator.cast_vote(self.conn, self.caller, request)
    }

    fn retract(&mut self, target: TargetRef) -> Result<VoteOutcome, VoteError> {
        self.coordinator.retract_vote(self.conn, self.caller, target)
    }
}
