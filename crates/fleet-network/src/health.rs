//! Heartbeat state machine
//!
//! A node goes `online` on any successful probe. A failed probe only takes it
//! `offline` once the last successful heartbeat is older than the grace
//! window, so a single dropped probe never flaps a healthy node.

use chrono::{DateTime, Utc};
use fleet_core::{Node, NodeStatus};
use std::time::Duration;

/// Result of a single health probe
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// The health endpoint returned 2xx
    Healthy {
        http_code: u16,
        cpu_percent: f64,
        memory_percent: f64,
    },
    /// Non-2xx, timeout, connection or DNS failure
    Failed {
        http_code: Option<u16>,
        /// Error class and detail, e.g. `timeout: ...`
        error: String,
    },
}

/// Rules applied to a node when a probe completes
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    grace_period: Duration,
}

impl HealthPolicy {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Apply a probe outcome observed at `now` to a node
    pub fn apply(&self, node: &mut Node, outcome: &ProbeOutcome, now: DateTime<Utc>) {
        match outcome {
            ProbeOutcome::Healthy {
                http_code,
                cpu_percent,
                memory_percent,
            } => {
                node.status = NodeStatus::Online;
                node.cpu_percent = Some(*cpu_percent);
                node.memory_percent = Some(*memory_percent);
                node.last_seen = Some(now);
                node.heartbeat_failures = 0;
                node.last_http_code = Some(*http_code);
                node.last_error = None;
            }
            ProbeOutcome::Failed { http_code, error } => {
                node.last_http_code = *http_code;
                node.last_error = Some(error.clone());
                node.heartbeat_failures = node.heartbeat_failures.saturating_add(1);

                if self.within_grace(node.last_seen, now) {
                    return;
                }

                node.status = NodeStatus::Offline;
                node.cpu_percent = Some(0.0);
                node.memory_percent = Some(0.0);
            }
        }
    }

    /// Whether `now` is still inside the grace window after `last_seen`
    fn within_grace(&self, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last_seen) = last_seen else {
            return false;
        };

        match (now - last_seen).to_std() {
            Ok(elapsed) => elapsed <= self.grace_period,
            // last_seen in the future (clock adjustment): treat as fresh
            Err(_) => true,
        }
    }
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
