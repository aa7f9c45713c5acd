//! fleet-core: Core types for the fleet orchestrator
//!
//! This crate provides the fundamental types used throughout fleet:
//! - Node, job, and container descriptors
//! - Scheduling strategy names
//! - Configuration types
//! - Error handling

pub mod config;
pub mod error;
pub mod model;

pub use config::*;
pub use error::*;
pub use model::*;
