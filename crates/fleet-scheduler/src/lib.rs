//! fleet-scheduler: Job placement and lifecycle
//!
//! This crate provides:
//! - Placement strategies (first fit, round robin, resource aware)
//! - A scheduler whose strategy can be switched at runtime
//! - The job controller (submit, dispatch, delete) with per-job locking
//! - The reconciliation loop and retention sweep

pub mod controller;
pub mod locks;
pub mod placement;
pub mod reconciler;
pub mod scheduler;

pub use controller::{JobController, JobSubmission};
pub use placement::PlacementStrategy;
pub use reconciler::{ReconcileReport, Reconciler};
pub use scheduler::Scheduler;
