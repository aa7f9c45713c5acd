//! Reconciliation loop
//!
//! Re-derives the status of running jobs from the containers their nodes
//! actually report, and sweeps containers that exited long ago. Every node
//! error is absorbed here. A store failure on one job is logged and the pass
//! moves on. A failure to list jobs is returned after the sweep has run.
//!
//! Job records are only written through the [`JobController`], so an exit is
//! never recorded over a placement made after the job was observed.

use chrono::{DateTime, Utc};
use fleet_core::{container_name_for, ContainerInfo, FleetResult, Job, JobStatus, Node};
use fleet_network::{BackgroundTask, NodeAgent, NodeRegistry};
use fleet_network::task::run_every;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::controller::JobController;

/// What a single reconciliation pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Jobs moved to `completed`
    pub completed: usize,
    /// Jobs moved to `failed`
    pub failed: usize,
    /// Exited containers removed by the retention sweep
    pub swept: usize,
    /// Jobs whose new state could not be stored
    pub errors: usize,
}

/// Keeps job records consistent with remote container state
pub struct Reconciler {
    registry: Arc<NodeRegistry>,
    agent: Arc<dyn NodeAgent>,
    controller: Arc<JobController>,
    retention: Duration,
}

impl Reconciler {
    pub fn new(
        registry: Arc<NodeRegistry>,
        agent: Arc<dyn NodeAgent>,
        controller: Arc<JobController>,
        retention: Duration,
    ) -> Self {
        Self {
            registry,
            agent,
            controller,
            retention,
        }
    }

    /// Start the reconciliation loop
    pub fn spawn(self: Arc<Self>, interval: Duration) -> BackgroundTask {
        info!(
            interval_secs = interval.as_secs(),
            retention_secs = self.retention.as_secs(),
            "Starting reconciler"
        );

        BackgroundTask::spawn("reconciler", move |cancel| async move {
            run_every(interval, cancel, || {
                let reconciler = self.clone();
                async move {
                    if let Err(e) = reconciler.reconcile_once().await {
                        error!(error = %e, "Reconciliation pass failed");
                    }
                }
            })
            .await;
        })
    }

    /// Run one reconciliation pass and retention sweep
    pub async fn reconcile_once(&self) -> FleetResult<ReconcileReport> {
        self.reconcile_at(Utc::now()).await
    }

    async fn reconcile_at(&self, now: DateTime<Utc>) -> FleetResult<ReconcileReport> {
        let online: HashMap<String, Node> = self
            .registry
            .healthy()
            .await
            .into_iter()
            .map(|node| (node.id.clone(), node))
            .collect();

        // A failed job listing still lets the sweep run; the error is
        // returned once the pass is over.
        let (jobs, list_error) = match self.controller.list().await {
            Ok(jobs) => (jobs, None),
            Err(e) => (Vec::new(), Some(e)),
        };

        let mut running_by_node: HashMap<String, Vec<Job>> = HashMap::new();
        for job in jobs {
            if job.status != JobStatus::Running {
                continue;
            }
            match job.node_id.as_deref() {
                Some(node_id) if online.contains_key(node_id) => {
                    running_by_node
                        .entry(node_id.to_string())
                        .or_default()
                        .push(job);
                }
                _ => debug!(job_id = %job.id, "Job node not online, skipping"),
            }
        }

        // One listing per online node, fetched concurrently; a failed
        // listing only affects that node.
        let listings: HashMap<String, Vec<ContainerInfo>> =
            join_all(online.values().map(|node| async move {
                let listing = self.agent.list_containers(&node.endpoint(), true).await;
                (node.id.clone(), listing)
            }))
            .await
            .into_iter()
            .filter_map(|(node_id, listing)| match listing {
                Ok(containers) => Some((node_id, containers)),
                Err(e) => {
                    warn!(node_id = %node_id, error = %e, "Failed to list containers");
                    None
                }
            })
            .collect();

        let mut report = ReconcileReport::default();

        for (node_id, jobs) in running_by_node {
            let Some(containers) = listings.get(&node_id) else {
                continue;
            };
            for job in jobs {
                if let Err(e) = self.reconcile_job(&job, containers, &mut report).await {
                    error!(job_id = %job.id, error = %e, "Failed to record job exit");
                    report.errors += 1;
                }
            }
        }

        for (node_id, containers) in &listings {
            let node = &online[node_id];
            report.swept += self.sweep(node, containers, now).await;
        }

        if report != ReconcileReport::default() {
            info!(
                completed = report.completed,
                failed = report.failed,
                swept = report.swept,
                errors = report.errors,
                "Reconciliation pass complete"
            );
        }

        match list_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn reconcile_job(
        &self,
        job: &Job,
        containers: &[ContainerInfo],
        report: &mut ReconcileReport,
    ) -> FleetResult<()> {
        let name = container_name_for(&job.id);
        let Some(container) = containers.iter().find(|c| c.normalized_name() == name) else {
            // A listing gap is not evidence of failure.
            debug!(job_id = %job.id, "Job container not listed, leaving state unchanged");
            return Ok(());
        };

        if !container.is_exited() {
            return Ok(());
        }

        let status = if container.exited_successfully() {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };

        if !self.controller.finish(job, status).await? {
            return Ok(());
        }

        info!(
            job_id = %job.id,
            exit_code = ?container.exit_indicator(),
            status = %status,
            "Job container exited"
        );
        match status {
            JobStatus::Completed => report.completed += 1,
            _ => report.failed += 1,
        }
        Ok(())
    }

    /// Remove containers that exited more than the retention window ago
    async fn sweep(&self, node: &Node, containers: &[ContainerInfo], now: DateTime<Utc>) -> usize {
        let mut swept = 0;

        for container in containers.iter().filter(|c| c.is_exited()) {
            let Some(finished_at) = container.finished_at else {
                continue;
            };
            let expired = (now - finished_at)
                .to_std()
                .map(|age| age > self.retention)
                .unwrap_or(false);
            if !expired {
                continue;
            }

            match self
                .agent
                .delete_container(&node.endpoint(), &container.id)
                .await
            {
                Ok(()) => {
                    debug!(
                        node_id = %node.id,
                        container = %container.normalized_name(),
                        "Removed expired container"
                    );
                    swept += 1;
                }
                Err(e) => warn!(
                    node_id = %node.id,
                    container = %container.normalized_name(),
                    error = %e,
                    "Failed to remove expired container"
                ),
            }
        }

        swept
    }
}
