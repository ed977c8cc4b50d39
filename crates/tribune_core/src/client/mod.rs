//! Client reconciliation layer.
//!
//! # Responsibility
//! - Keep an optimistic local copy of tallies and the user's own votes.
//! - Talk to the coordinator only through `VoteTransport`.
//!
//! # Invariants
//! - The coordinator's response is always the last word.
//! - Every optimistic change is either reconciled or rolled back.

pub mod local;
pub mod mirror;
