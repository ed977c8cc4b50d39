//! Reputation (aura) propagation for opinion votes.
//!
//! # Responsibility
//! - Translate an opinion vote transition into an aura delta for the author.
//! - Apply the delta through the user directory.
//!
//! # Invariants
//! - Delta is `Δlikes - Δdislikes` of the transition.
//! - Votes on one's own opinion never change aura.
//! - Article votes never reach this module.
//! - Aura is stored once on the user; opinions join it at read time, so no
//!   per-opinion write happens here.

use crate::model::vote::{Transition, UserId};
use crate::repo::error::RepoResult;
use crate::repo::user_repo::UserDirectory;
use log::debug;

/// One opinion vote as seen by the propagator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpinionVoteChange {
    pub voter: UserId,
    pub author: UserId,
    pub transition: Transition,
}

/// Result of one propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuraUpdate {
    pub author: UserId,
    /// Applied delta; zero for self-votes and no-op transitions.
    pub delta: i64,
    /// Author aura after the update.
    pub aura: i64,
}

/// Aura delta implied by a like/dislike transition.
///
/// `+1` new like, `-1` new dislike, `-2` like to dislike, `+2` dislike to
/// like, `-1`/`+1` when a like/dislike is retracted.
pub fn aura_delta(transition: Transition) -> i64 {
    let delta = transition.delta();
    delta.positive - delta.negative
}

/// Applies opinion vote transitions to author aura.
pub struct ReputationPropagator<U: UserDirectory> {
    users: U,
}

impl<U: UserDirectory> ReputationPropagator<U> {
    pub fn new(users: U) -> Self {
        Self { users }
    }

    /// Recomputes the author's aura for one transition.
    ///
    /// Returns the author's current aura even when nothing changed, so the
    /// caller can report it as authoritative state.
    pub fn propagate(&self, change: &OpinionVoteChange) -> RepoResult<AuraUpdate> {
        let delta = if change.voter == change.author {
            0
        } else {
            aura_delta(change.transition)
        };

        let aura = if delta == 0 {
            self.users.aura(change.author)?
        } else {
            self.users.adjust_aura(change.author, delta)?
        };

        debug!(
            "event=aura_propagate module=reputation status={} transition={} delta={delta}",
            if delta == 0 { "noop" } else { "ok" },
            change.transition.label()
        );

        Ok(AuraUpdate {
            author: change.author,
            delta,
            aura,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::aura_delta;
    use crate::model::vote::{Choice, Transition};

    #[test]
    fn like_and_dislike_move_aura_by_one() {
        assert_eq!(aura_delta(Transition::between(None, Some(Choice::Like))), 1);
        assert_eq!(aura_delta(Transition::between(None, Some(Choice::Dislike))), -1);
    }

    #[test]
    fn switching_sides_moves_aura_by_two() {
        assert_eq!(
            aura_delta(Transition::between(Some(Choice::Like), Some(Choice::Dislike))),
            -2
        );
        assert_eq!(
            aura_delta(Transition::between(Some(Choice::Dislike), Some(Choice::Like))),
            2
        );
    }

    #[test]
    fn retraction_and_repeat_are_symmetric() {
        assert_eq!(aura_delta(Transition::between(Some(Choice::Like), None)), -1);
        assert_eq!(aura_delta(Transition::between(Some(Choice::Dislike), None)), 1);
        assert_eq!(
            aura_delta(Transition::between(Some(Choice::Like), Some(Choice::Like))),
            0
        );
    }
}
