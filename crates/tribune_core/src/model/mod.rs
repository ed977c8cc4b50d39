//! Domain model for votes, tallies and the content they apply to.
//!
//! # Responsibility
//! - Define canonical data structures used by the vote engine.
//! - Keep the transition table in one place so server and client agree.
//!
//! # Invariants
//! - Every user and target is identified by a stable UUID.
//! - A user holds at most one active choice per target.

pub mod content;
pub mod vote;
