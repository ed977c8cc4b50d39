//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define the store contracts the vote coordinator composes.
//! - Keep SQL details out of service orchestration.
//!
//! # Invariants
//! - Stores accept any `&Connection`, including an open transaction, so one
//!   commit can cover records, tallies and aura.
//! - Repository APIs return semantic errors (`TargetNotFound`,
//!   `UserNotFound`, `TallyDrift`) in addition to DB transport errors.

pub mod content_repo;
pub mod error;
mod sql;
pub mod tally_repo;
pub mod user_repo;
pub mod vote_repo;
