//! fleet-network: Node communication and health
//!
//! This crate provides everything the control plane uses to talk to nodes:
//! - `NodeAgent` trait and its HTTP client
//! - Heartbeat state machine with a grace window
//! - Node registry with cached and refreshing reads
//! - Background health monitor and cancellable task handles

pub mod agent;
pub mod health;
pub mod monitor;
pub mod registry;
pub mod task;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use agent::{HttpAgentClient, NodeAgent};
pub use health::{HealthPolicy, ProbeOutcome};
pub use monitor::HealthMonitor;
pub use registry::NodeRegistry;
pub use task::BackgroundTask;
