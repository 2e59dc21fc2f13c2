//! Data Transfer Objects
//!
//! Request types accepted by the controller when operators register
//! repositories and credentials, and the views it lists them through.

pub mod credential;
pub mod repository;
