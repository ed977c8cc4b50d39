//! Core use-case services.
//!
//! # Responsibility
//! - Compose repository calls into vote use-cases.
//! - Own concurrency control and the transaction boundary.

pub mod in_flight;
pub mod reputation;
pub mod vote_service;
