//! Service layer
//!
//! Business logic for reconciling repositories against the cluster.

pub mod reconcile;

pub use reconcile::{ReconcileError, ReconcileManager};
