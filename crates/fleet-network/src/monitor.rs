//! Background health monitor

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::registry::NodeRegistry;
use crate::task::{run_every, BackgroundTask};

/// Periodically refreshes the health of every registered node
pub struct HealthMonitor {
    registry: Arc<NodeRegistry>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<NodeRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Start the monitor loop
    pub fn spawn(self) -> BackgroundTask {
        info!(interval_secs = self.interval.as_secs(), "Starting health monitor");

        BackgroundTask::spawn("health-monitor", move |cancel| async move {
            let registry = self.registry;
            run_every(self.interval, cancel, || {
                let registry = registry.clone();
                async move { registry.refresh_all().await }
            })
            .await;
        })
    }
}
