//! Lodestar Core
//!
//! Core types and abstractions for the Lodestar GitOps controller.
//!
//! This crate contains:
//! - Domain types: Repositories, credentials, tracked job files, snapshots and job status
//! - DTOs: Data transfer objects for creating repositories and credentials

pub mod domain;
pub mod dto;
