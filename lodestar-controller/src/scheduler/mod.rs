//! Scheduler layer for the controller
//!
//! Drives reconciliation: a timer loop runs full cycles at the configured
//! interval, and on-demand passes (after a repository is registered, or when
//! asked through the API) run as tracked tasks that shutdown can wait for.

pub mod poller;
pub mod tasks;

pub use poller::ReconcilePoller;
pub use tasks::ReconcileTasks;
