//! Core domain types
//!
//! This module contains the core domain structures used across Lodestar crates.
//! They are shared between the controller (persistence, reconciliation) and the
//! cluster client (job submission, status queries).

pub mod credential;
pub mod job;
pub mod repository;
pub mod snapshot;
pub mod status;
pub mod tracked_file;
