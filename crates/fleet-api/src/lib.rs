//! fleet-api: REST API server for the fleet control plane
//!
//! This crate provides the REST API for interacting with fleet:
//! - Node registration, health, and container listing
//! - Job submission, dispatch, and deletion
//! - Scheduler settings and system status

pub mod rest;

pub use rest::{create_router, error_response, AppState};
