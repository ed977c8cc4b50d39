//! Optimistic client-side mirror of tallies and the user's own votes.
//!
//! # Responsibility
//! - Apply a vote or a retraction locally before the coordinator answers.
//! - Replace the guess with the coordinator's outcome on success.
//! - Restore the pre-click state on any failure.
//!
//! # Invariants
//! - At most one outstanding request per target.
//! - A completed request leaves the entry equal to either the server's
//!   outcome or the last server-confirmed value; nothing in between.
//! - Server refreshes that arrive while a request is pending become the
//!   rollback base instead of being overwritten by the optimistic guess.

use crate::model::vote::{Choice, Tally, TargetRef, Transition};
use crate::service::vote_service::{VoteError, VoteOutcome, VoteRequest};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Request/response seam to the vote coordinator.
pub trait VoteTransport {
    fn send(&mut self, request: &VoteRequest) -> Result<VoteOutcome, VoteError>;

    fn retract(&mut self, target: TargetRef) -> Result<VoteOutcome, VoteError>;
}

/// Client-side reconciliation errors.
#[derive(Debug)]
pub enum ReconcileError {
    /// A request for this target is still outstanding.
    RequestInFlight(TargetRef),
    /// Choice does not belong to the target kind; nothing was sent.
    InvalidChoice { target: TargetRef, choice: Choice },
    /// Coordinator rejected the vote; the mirror entry was rolled back.
    Rejected(VoteError),
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestInFlight(target) => write!(f, "vote already pending for {target}"),
            Self::InvalidChoice { target, choice } => {
                write!(f, "choice `{choice}` is not valid for {target}")
            }
            Self::Rejected(err) => write!(f, "vote rejected: {err}"),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

/// What the user asked for on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteAction {
    Cast(VoteRequest),
    Retract(TargetRef),
}

impl VoteAction {
    pub fn target(&self) -> TargetRef {
        match self {
            Self::Cast(request) => request.target(),
            Self::Retract(target) => *target,
        }
    }

    /// The user's choice once the action lands.
    pub fn next_choice(&self) -> Option<Choice> {
        match self {
            Self::Cast(request) => Some(request.choice),
            Self::Retract(_) => None,
        }
    }

    /// Sends the action over `transport`.
    pub fn dispatch<T: VoteTransport>(
        &self,
        transport: &mut T,
    ) -> Result<VoteOutcome, VoteError> {
        match self {
            Self::Cast(request) => transport.send(request),
            Self::Retract(target) => transport.retract(*target),
        }
    }
}

/// Optimistic change awaiting the coordinator's answer.
///
/// Must be handed back to [`VoteMirror::complete`]; the target stays
/// locked against new clicks until then.
#[derive(Debug)]
#[must_use = "a pending vote keeps its target locked until completed"]
pub struct PendingVote {
    action: VoteAction,
    optimistic: Tally,
}

impl PendingVote {
    pub fn action(&self) -> &VoteAction {
        &self.action
    }

    /// The cast request, or `None` for a retraction.
    pub fn request(&self) -> Option<&VoteRequest> {
        match &self.action {
            VoteAction::Cast(request) => Some(request),
            VoteAction::Retract(_) => None,
        }
    }

    /// Tally shown to the user while the request is outstanding.
    pub fn optimistic_tally(&self) -> Tally {
        self.optimistic
    }
}

/// State to return to if the pending request fails.
#[derive(Debug, Clone, Copy)]
struct Rollback {
    choice: Option<Choice>,
    tally: Option<Tally>,
    transition: Transition,
}

/// Local mirror: `myVoteByTarget`, `tallyMirror` and the last known
/// author aura of each opinion.
#[derive(Debug, Default)]
pub struct VoteMirror {
    my_votes: HashMap<TargetRef, Choice>,
    tallies: HashMap<TargetRef, Tally>,
    author_auras: HashMap<TargetRef, i64>,
    pending: HashMap<TargetRef, Rollback>,
}

impl VoteMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the mirror from server state at session start.
    pub fn hydrate(
        &mut self,
        votes: impl IntoIterator<Item = (TargetRef, Choice)>,
        tallies: impl IntoIterator<Item = (TargetRef, Tally)>,
    ) {
        self.hydrate_votes(votes);
        for (target, tally) in tallies {
            self.seed_tally(target, tally);
        }
    }

    /// Seeds the user's own choices, e.g. from `votes_for_user`.
    ///
    /// For a pending target only the rollback base is updated.
    pub fn hydrate_votes(&mut self, votes: impl IntoIterator<Item = (TargetRef, Choice)>) {
        for (target, choice) in votes {
            match self.pending.get_mut(&target) {
                Some(rollback) => rollback.choice = Some(choice),
                None => {
                    self.my_votes.insert(target, choice);
                }
            }
        }
    }

    /// Seeds or refreshes one tally from server state.
    ///
    /// For a pending target the fresh value becomes the rollback base and
    /// the shown tally is the fresh value with the pending change applied.
    pub fn seed_tally(&mut self, target: TargetRef, tally: Tally) {
        let shown = match self.pending.get_mut(&target) {
            Some(rollback) => {
                rollback.tally = Some(tally);
                tally.apply(rollback.transition)
            }
            None => tally,
        };
        self.tallies.insert(target, shown);
    }

    /// Seeds or refreshes the author aura shown next to an opinion.
    pub fn seed_author_aura(&mut self, target: TargetRef, aura: i64) {
        self.author_auras.insert(target, aura);
    }

    pub fn my_vote(&self, target: &TargetRef) -> Option<Choice> {
        self.my_votes.get(target).copied()
    }

    pub fn tally(&self, target: &TargetRef) -> Option<Tally> {
        self.tallies.get(target).copied()
    }

    /// Author aura from the last confirmed opinion outcome.
    pub fn author_aura(&self, target: &TargetRef) -> Option<i64> {
        self.author_auras.get(target).copied()
    }

    pub fn is_pending(&self, target: &TargetRef) -> bool {
        self.pending.contains_key(target)
    }

    /// Applies the expected transition locally and returns the request to send.
    pub fn begin(
        &mut self,
        target: TargetRef,
        choice: Choice,
    ) -> Result<PendingVote, ReconcileError> {
        if choice.kind() != target.kind {
            return Err(ReconcileError::InvalidChoice { target, choice });
        }
        self.begin_action(VoteAction::Cast(VoteRequest::new(target, choice)))
    }

    /// Removes the user's choice locally and returns the retraction to send.
    ///
    /// With no local choice the tally is left as is.
    pub fn begin_retract(&mut self, target: TargetRef) -> Result<PendingVote, ReconcileError> {
        self.begin_action(VoteAction::Retract(target))
    }

    fn begin_action(&mut self, action: VoteAction) -> Result<PendingVote, ReconcileError> {
        let target = action.target();
        if self.is_pending(&target) {
            return Err(ReconcileError::RequestInFlight(target));
        }

        let next = action.next_choice();
        let rollback = Rollback {
            choice: self.my_vote(&target),
            tally: self.tally(&target),
            transition: Transition::between(self.my_vote(&target), next),
        };
        let optimistic = rollback
            .tally
            .unwrap_or_default()
            .apply(rollback.transition);

        self.pending.insert(target, rollback);
        self.tallies.insert(target, optimistic);
        set_or_remove(&mut self.my_votes, target, next);

        Ok(PendingVote { action, optimistic })
    }

    /// Reconciles a pending vote with the coordinator's answer.
    ///
    /// On success the server outcome replaces the optimistic guess; on
    /// failure the entry returns to its last server-confirmed value.
    pub fn complete(
        &mut self,
        pending: PendingVote,
        result: Result<VoteOutcome, VoteError>,
    ) -> Result<Tally, ReconcileError> {
        let target = pending.action.target();
        let rollback = self.pending.remove(&target);

        match result {
            Ok(outcome) => {
                let tally = outcome.tally();
                self.tallies.insert(target, tally);
                if let Some(aura) = outcome.author_aura() {
                    self.author_auras.insert(target, aura);
                }
                set_or_remove(&mut self.my_votes, target, pending.action.next_choice());
                Ok(tally)
            }
            Err(err) => {
                if let Some(rollback) = rollback {
                    set_or_remove(&mut self.tallies, target, rollback.tally);
                    set_or_remove(&mut self.my_votes, target, rollback.choice);
                }
                Err(ReconcileError::Rejected(err))
            }
        }
    }

    /// Runs `begin`, `send` and `complete` in sequence.
    pub fn vote<T: VoteTransport>(
        &mut self,
        transport: &mut T,
        target: TargetRef,
        choice: Choice,
    ) -> Result<Tally, ReconcileError> {
        let pending = self.begin(target, choice)?;
        self.round_trip(transport, pending)
    }

    /// Runs `begin_retract`, `retract` and `complete` in sequence.
    pub fn retract<T: VoteTransport>(
        &mut self,
        transport: &mut T,
        target: TargetRef,
    ) -> Result<Tally, ReconcileError> {
        let pending = self.begin_retract(target)?;
        self.round_trip(transport, pending)
    }

    fn round_trip<T: VoteTransport>(
        &mut self,
        transport: &mut T,
        pending: PendingVote,
    ) -> Result<Tally, ReconcileError> {
        let result = pending.action.dispatch(transport);
        self.complete(pending, result)
    }
}

fn set_or_remove<V>(map: &mut HashMap<TargetRef, V>, target: TargetRef, value: Option<V>) {
    match value {
        Some(value) => {
            map.insert(target, value);
        }
        None => {
            map.remove(&target);
        }
    }
}
