//! Host-facing bindings for the vote engine.

pub mod api;
