//! Job lifecycle: submission, placement, dispatch, and deletion

use fleet_core::{ContainerRequest, FleetError, FleetResult, Job, JobStatus};
use fleet_network::{NodeAgent, NodeRegistry};
use fleet_store::Collection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::locks::JobLocks;
use crate::scheduler::Scheduler;

/// Body of a job submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub id: String,
    pub image: String,
    #[serde(default)]
    pub command: Option<String>,
}

/// Owns job records and drives them through placement and dispatch
///
/// Every read-modify-write of a record runs under that job's lock.
pub struct JobController {
    registry: Arc<NodeRegistry>,
    scheduler: Arc<Scheduler>,
    agent: Arc<dyn NodeAgent>,
    jobs: Arc<dyn Collection<Job>>,
    locks: JobLocks,
}

impl JobController {
    pub fn new(
        registry: Arc<NodeRegistry>,
        scheduler: Arc<Scheduler>,
        agent: Arc<dyn NodeAgent>,
        jobs: Arc<dyn Collection<Job>>,
    ) -> Self {
        Self {
            registry,
            scheduler,
            agent,
            jobs,
            locks: JobLocks::new(),
        }
    }

    /// Submit a job.
    ///
    /// A new id is placed and persisted. Resubmitting an id that is still
    /// `pending` retries placement; any other existing job is returned as is.
    /// Having no capacity is not an error: the job is stored as `pending`.
    pub async fn submit(&self, submission: JobSubmission) -> FleetResult<Job> {
        let _guard = self.locks.lock(&submission.id).await;

        if let Some(existing) = self.jobs.find(&submission.id).await? {
            return self.retry_pending(existing).await;
        }

        info!(
            job_id = %submission.id,
            image = %submission.image,
            "Job submitted"
        );
        let job = Job::new(submission.id, submission.image, submission.command);
        let job = self.place(job).await;

        // The container may already exist if this fails; the record is not rolled back.
        self.jobs.insert(job.clone()).await?;
        Ok(job)
    }

    /// Re-run placement for a pending job; other states are returned as is
    pub async fn dispatch(&self, id: &str) -> FleetResult<Job> {
        let _guard = self.locks.lock(id).await;
        let job = self.get(id).await?;
        self.retry_pending(job).await
    }

    /// Caller holds the job lock and `job` was read under it
    async fn retry_pending(&self, job: Job) -> FleetResult<Job> {
        if job.status != JobStatus::Pending {
            debug!(job_id = %job.id, status = %job.status, "Job already placed");
            return Ok(job);
        }

        info!(job_id = %job.id, "Retrying placement of pending job");
        let job = self.place(job).await;
        if !self.jobs.update(job.clone()).await? {
            return Err(FleetError::JobNotFound(job.id));
        }
        Ok(job)
    }

    /// Record the observed exit of a running job.
    ///
    /// The write only happens if the stored record is still the same running
    /// placement that was observed; returns whether it did.
    pub async fn finish(&self, observed: &Job, status: JobStatus) -> FleetResult<bool> {
        let _guard = self.locks.lock(&observed.id).await;

        let Some(mut current) = self.jobs.find(&observed.id).await? else {
            debug!(job_id = %observed.id, "Job deleted before its exit was recorded");
            return Ok(false);
        };
        let same_placement = current.status == JobStatus::Running
            && current.node_id == observed.node_id
            && current.container_id == observed.container_id
            && current.created_at == observed.created_at;
        if !same_placement {
            debug!(job_id = %observed.id, "Job changed since it was observed, skipping");
            return Ok(false);
        }

        current.transition(status);
        self.jobs.update(current).await
    }

    /// Pick a node from the cached healthy view and create the container
    async fn place(&self, mut job: Job) -> Job {
        let candidates = self.registry.healthy().await;
        if candidates.is_empty() {
            info!(job_id = %job.id, "No healthy nodes, job left pending");
            job.transition(JobStatus::Pending);
            return job;
        }

        let Some(node) = self.scheduler.schedule(&job, &candidates) else {
            job.transition(JobStatus::Pending);
            return job;
        };

        let request = ContainerRequest {
            image: job.image.clone(),
            name: job.container_name(),
            command: job.command.clone(),
        };

        // The node may have gone offline since the cached read; that is an
        // ordinary dispatch failure.
        job.node_id = Some(node.id.clone());
        match self.agent.create_container(&node.endpoint(), &request).await {
            Ok(container) => {
                info!(
                    job_id = %job.id,
                    node_id = %node.id,
                    container_id = %container.id,
                    "Job dispatched"
                );
                job.container_id = Some(container.id);
                job.transition(JobStatus::Running);
            }
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    node_id = %node.id,
                    error = %e,
                    "Dispatch failed"
                );
                job.transition(JobStatus::Failed);
            }
        }

        job
    }

    pub async fn get(&self, id: &str) -> FleetResult<Job> {
        self.jobs
            .find(id)
            .await?
            .ok_or_else(|| FleetError::JobNotFound(id.to_string()))
    }

    pub async fn list(&self) -> FleetResult<Vec<Job>> {
        self.jobs.find_all().await
    }

    /// Delete a job record, best-effort removing its container first
    pub async fn delete(&self, id: &str) -> FleetResult<Job> {
        let _guard = self.locks.lock(id).await;
        let job = self.get(id).await?;

        if job.status == JobStatus::Running {
            self.remove_container(&job).await;
        }

        if !self.jobs.delete(id).await? {
            return Err(FleetError::JobNotFound(id.to_string()));
        }

        info!(job_id = %id, "Job deleted");
        Ok(job)
    }

    async fn remove_container(&self, job: &Job) {
        let Some(node_id) = &job.node_id else {
            return;
        };

        let node = match self.registry.get(node_id).await {
            Some(node) if node.is_online() => node,
            _ => {
                debug!(
                    job_id = %job.id,
                    node_id = %node_id,
                    "Node not online, leaving container to the retention sweep"
                );
                return;
            }
        };

        match self
            .agent
            .delete_container(&node.endpoint(), &job.container_name())
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(job_id = %job.id, node_id = %node_id, "Job container already gone");
            }
            Err(e) => warn!(
                job_id = %job.id,
                node_id = %node_id,
                error = %e,
                "Failed to delete job container"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fleet_core::{NodeSpec, SchedulingStrategy};
    use fleet_network::testing::{spec, ScriptedAgent};
    use fleet_network::HealthPolicy;
    use fleet_store::MemoryCollection;
    use std::time::Duration;

    struct Harness {
        agent: Arc<ScriptedAgent>,
        registry: Arc<NodeRegistry>,
        jobs: Arc<MemoryCollection<Job>>,
        controller: JobController,
    }

    fn harness(strategy: SchedulingStrategy) -> Harness {
        let agent = Arc::new(ScriptedAgent::new());
        let registry = Arc::new(NodeRegistry::new(agent.clone(), HealthPolicy::default()));
        let jobs: Arc<MemoryCollection<Job>> = Arc::new(MemoryCollection::new());
        let controller = JobController::new(
            registry.clone(),
            Arc::new(Scheduler::new(strategy)),
            agent.clone(),
            jobs.clone(),
        );
        Harness {
            agent,
            registry,
            jobs,
            controller,
        }
    }

    impl Harness {
        async fn online(&self, id: &str, port: u16, cpu: f64) -> NodeSpec {
            let node = spec(id, port);
            self.agent.set_healthy(&node, cpu, 10.0);
            self.registry.register(node.clone()).await.unwrap();
            node
        }
    }

    fn submission(id: &str) -> JobSubmission {
        JobSubmission {
            id: id.to_string(),
            image: "busybox".to_string(),
            command: Some("echo hi".to_string()),
        }
    }

    #[tokio::test]
    async fn test_submit_without_nodes_is_pending() {
        let h = harness(SchedulingStrategy::FirstFit);

        let job = h.controller.submit(submission("1")).await.unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.node_id.is_none());
        let stored = h.jobs.find("1").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert!(h.agent.created().is_empty());
    }

    #[tokio::test]
    async fn test_submit_dispatches_to_healthy_node() {
        let h = harness(SchedulingStrategy::FirstFit);
        h.online("node1", 9001, 10.0).await;

        let job = h.controller.submit(submission("1")).await.unwrap();

        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.node_id.as_deref(), Some("node1"));
        assert_eq!(job.container_id.as_deref(), Some("c-job-1"));

        let created = h.agent.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0, "127.0.0.1:9001");
        assert_eq!(created[0].1.name, "job-1");
        assert_eq!(created[0].1.command.as_deref(), Some("echo hi"));

        let stored = h.controller.get("1").await.unwrap();
        assert_eq!(stored, job);
    }

    #[tokio::test]
    async fn test_submit_dispatch_failure_marks_failed() {
        let h = harness(SchedulingStrategy::FirstFit);
        let node = h.online("node1", 9001, 10.0).await;
        h.agent.reject_creates(&node);

        let job = h.controller.submit(submission("1")).await.unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.container_id.is_none());
        assert_eq!(
            h.jobs.find("1").await.unwrap().unwrap().status,
            JobStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_submit_skips_offline_nodes() {
        let h = harness(SchedulingStrategy::FirstFit);
        h.registry.register(spec("dead", 9001)).await.unwrap();
        h.online("live", 9002, 10.0).await;

        let job = h.controller.submit(submission("1")).await.unwrap();
        assert_eq!(job.node_id.as_deref(), Some("live"));
    }

    #[tokio::test]
    async fn test_resource_aware_submission() {
        let h = harness(SchedulingStrategy::ResourceAware);
        h.online("busy", 9001, 80.0).await;
        h.online("idle", 9002, 20.0).await;

        let job = h.controller.submit(submission("1")).await.unwrap();
        assert_eq!(job.node_id.as_deref(), Some("idle"));
    }

    #[tokio::test]
    async fn test_resubmit_pending_job_retries_placement() {
        let h = harness(SchedulingStrategy::FirstFit);
        let first = h.controller.submit(submission("1")).await.unwrap();
        assert_eq!(first.status, JobStatus::Pending);

        h.online("node1", 9001, 10.0).await;
        let second = h.controller.submit(submission("1")).await.unwrap();

        assert_eq!(second.status, JobStatus::Running);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(h.jobs.find_all().await.unwrap().len(), 1);

        // Running jobs are returned unchanged
        let third = h.controller.submit(submission("1")).await.unwrap();
        assert_eq!(third, second);
        assert_eq!(h.agent.created().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch() {
        let h = harness(SchedulingStrategy::FirstFit);
        h.controller.submit(submission("1")).await.unwrap();

        let still_pending = h.controller.dispatch("1").await.unwrap();
        assert_eq!(still_pending.status, JobStatus::Pending);

        h.online("node1", 9001, 10.0).await;
        let job = h.controller.dispatch("1").await.unwrap();
        assert_eq!(job.status, JobStatus::Running);

        let missing = h.controller.dispatch("nope").await;
        assert!(matches!(missing, Err(FleetError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_places_once() {
        let h = harness(SchedulingStrategy::FirstFit);
        h.controller.submit(submission("1")).await.unwrap();
        let node = h.online("node1", 9001, 10.0).await;
        h.agent.delay_creates(&node, Duration::from_millis(50));

        let (a, b) = tokio::join!(h.controller.dispatch("1"), h.controller.dispatch("1"));

        assert_eq!(a.unwrap().status, JobStatus::Running);
        assert_eq!(b.unwrap().status, JobStatus::Running);
        assert_eq!(h.agent.created().len(), 1);
        let stored = h.controller.get("1").await.unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        assert_eq!(stored.container_id.as_deref(), Some("c-job-1"));
    }

    #[tokio::test]
    async fn test_concurrent_submissions_of_new_id() {
        let h = harness(SchedulingStrategy::FirstFit);
        let node = h.online("node1", 9001, 10.0).await;
        h.agent.delay_creates(&node, Duration::from_millis(50));

        let (a, b) = tokio::join!(
            h.controller.submit(submission("1")),
            h.controller.submit(submission("1"))
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert_eq!(a.status, JobStatus::Running);
        assert_eq!(h.agent.created().len(), 1);
        assert_eq!(h.jobs.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_finish_records_exit_once() {
        let h = harness(SchedulingStrategy::FirstFit);
        h.online("node1", 9001, 10.0).await;
        let observed = h.controller.submit(submission("1")).await.unwrap();

        assert!(h.controller.finish(&observed, JobStatus::Completed).await.unwrap());
        assert!(!h.controller.finish(&observed, JobStatus::Failed).await.unwrap());
        assert_eq!(
            h.controller.get("1").await.unwrap().status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_finish_skips_replaced_job() {
        let h = harness(SchedulingStrategy::FirstFit);
        h.online("node1", 9001, 10.0).await;
        let observed = h.controller.submit(submission("1")).await.unwrap();

        // Deleted and resubmitted while the exit was being observed
        h.controller.delete("1").await.unwrap();
        h.registry.remove("node1").await.unwrap();
        h.controller.submit(submission("1")).await.unwrap();

        assert!(!h.controller.finish(&observed, JobStatus::Failed).await.unwrap());
        assert_eq!(h.controller.get("1").await.unwrap().status, JobStatus::Pending);

        h.controller.delete("1").await.unwrap();
        assert!(!h.controller.finish(&observed, JobStatus::Failed).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_running_job_removes_container() {
        let h = harness(SchedulingStrategy::FirstFit);
        h.online("node1", 9001, 10.0).await;
        h.controller.submit(submission("1")).await.unwrap();

        let deleted = h.controller.delete("1").await.unwrap();

        assert_eq!(deleted.id, "1");
        assert_eq!(
            h.agent.deleted(),
            vec![("127.0.0.1:9001".to_string(), "job-1".to_string())]
        );
        assert!(h.jobs.find("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_running_job_on_offline_node() {
        let h = harness(SchedulingStrategy::FirstFit);
        let node = h.online("node1", 9001, 10.0).await;
        h.controller.submit(submission("1")).await.unwrap();

        // Same node seen by a registry where it is offline
        h.agent.set_unreachable(&node);
        let offline = Arc::new(NodeRegistry::new(
            h.agent.clone(),
            HealthPolicy::default(),
        ));
        offline.register(node).await.unwrap();
        assert!(offline.healthy().await.is_empty());
        let controller = JobController::new(
            offline,
            Arc::new(Scheduler::default()),
            h.agent.clone(),
            h.jobs.clone(),
        );

        controller.delete("1").await.unwrap();

        assert!(h.agent.deleted().is_empty());
        assert!(h.jobs.find("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_survives_container_removal_failure() {
        let h = harness(SchedulingStrategy::FirstFit);
        let node = h.online("node1", 9001, 10.0).await;
        h.controller.submit(submission("1")).await.unwrap();
        h.agent.set_containers(&node, Vec::new());

        h.controller.delete("1").await.unwrap();

        assert_eq!(h.agent.deleted().len(), 1);
        assert!(h.jobs.find("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_survives_unreachable_node() {
        let h = harness(SchedulingStrategy::FirstFit);
        let node = h.online("node1", 9001, 10.0).await;
        h.controller.submit(submission("1")).await.unwrap();
        // Still online in the cached view
        h.agent.set_unreachable(&node);

        h.controller.delete("1").await.unwrap();

        assert_eq!(h.agent.deleted().len(), 1);
        assert!(h.jobs.find("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_job() {
        let h = harness(SchedulingStrategy::FirstFit);
        let result = h.controller.delete("missing").await;
        assert!(matches!(result, Err(FleetError::JobNotFound(_))));
    }

    struct UnavailableStore;

    #[async_trait]
    impl Collection<Job> for UnavailableStore {
        async fn insert(&self, _doc: Job) -> FleetResult<()> {
            Err(FleetError::StoreUnavailable("disk full".to_string()))
        }
        async fn find(&self, _id: &str) -> FleetResult<Option<Job>> {
            Ok(None)
        }
        async fn find_all(&self) -> FleetResult<Vec<Job>> {
            Ok(Vec::new())
        }
        async fn update(&self, _doc: Job) -> FleetResult<bool> {
            Err(FleetError::StoreUnavailable("disk full".to_string()))
        }
        async fn delete(&self, _id: &str) -> FleetResult<bool> {
            Err(FleetError::StoreUnavailable("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_after_dispatch() {
        let h = harness(SchedulingStrategy::FirstFit);
        h.online("node1", 9001, 10.0).await;
        let controller = JobController::new(
            h.registry.clone(),
            Arc::new(Scheduler::default()),
            h.agent.clone(),
            Arc::new(UnavailableStore),
        );

        let result = controller.submit(submission("1")).await;

        assert!(matches!(result, Err(FleetError::StoreUnavailable(_))));
        // The container was created before the store failed
        assert_eq!(h.agent.created().len(), 1);
    }
}
