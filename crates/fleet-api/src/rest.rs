//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use fleet_core::{
    ContainerInfo, FleetError, Job, JobStatus, Node, NodeSpec, NodeStatus, SchedulingStrategy,
};
use fleet_network::{NodeAgent, NodeRegistry};
use fleet_scheduler::{JobController, JobSubmission, Scheduler};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub registry: Arc<NodeRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub controller: Arc<JobController>,
    pub agent: Arc<dyn NodeAgent>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/nodes", get(list_nodes).post(register_node))
        .route("/api/v1/nodes/:id", get(get_node).delete(remove_node))
        .route("/api/v1/nodes/:id/ping", post(ping_node))
        .route("/api/v1/nodes/:id/containers", get(list_node_containers))
        .route("/api/v1/jobs", get(list_jobs).post(submit_job))
        .route("/api/v1/jobs/:id", get(get_job).delete(delete_job))
        .route("/api/v1/jobs/:id/dispatch", post(dispatch_job))
        .route(
            "/api/v1/settings/scheduler",
            get(get_scheduler_settings).put(update_scheduler_settings),
        )
        .route("/api/v1/status", get(get_status))
        .with_state(state)
}

/// Map a domain error to an HTTP status and message
pub fn error_response(err: FleetError) -> (StatusCode, String) {
    let status = match &err {
        FleetError::NodeNotFound(_)
        | FleetError::JobNotFound(_)
        | FleetError::ContainerNotFound(_) => StatusCode::NOT_FOUND,
        FleetError::InvalidStrategy(_) => StatusCode::BAD_REQUEST,
        FleetError::AlreadyExists(_) => StatusCode::CONFLICT,
        FleetError::NodeUnreachable(_) | FleetError::DispatchFailed(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn bad_request(message: &str) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.to_string())
}

fn node_not_found(id: &str) -> (StatusCode, String) {
    error_response(FleetError::NodeNotFound(id.to_string()))
}

/// Acknowledgement for deletions
#[derive(Debug, Serialize, Deserialize)]
pub struct Removed {
    pub status: String,
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub nodes: usize,
}

/// Liveness of the control plane itself
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        nodes: state.registry.len().await,
    })
}

/// List nodes, probing each first
async fn list_nodes(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Node>> {
    Ok(Json(state.registry.list_refreshed().await))
}

/// Register or overwrite a node
async fn register_node(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<NodeSpec>,
) -> ApiResult<Node> {
    if spec.id.trim().is_empty() {
        return Err(bad_request("node id must not be empty"));
    }

    let node = state.registry.register(spec).await.map_err(error_response)?;
    Ok(Json(node))
}

/// Get a node, probing it first
async fn get_node(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Node> {
    state
        .registry
        .get_refreshed(&id)
        .await
        .map(Json)
        .ok_or_else(|| node_not_found(&id))
}

/// Remove a node
async fn remove_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Removed> {
    if !state.registry.remove(&id).await.map_err(error_response)? {
        return Err(node_not_found(&id));
    }

    Ok(Json(Removed {
        status: "removed".to_string(),
        id,
    }))
}

/// Force one heartbeat and return the node with its diagnostics
async fn ping_node(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Node> {
    info!(node_id = %id, "Manual ping");
    state
        .registry
        .refresh(&id)
        .await
        .map(Json)
        .ok_or_else(|| node_not_found(&id))
}

/// Every container on a node, including stopped ones
async fn list_node_containers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<ContainerInfo>> {
    let node = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| node_not_found(&id))?;

    let containers = state
        .agent
        .list_containers(&node.endpoint(), true)
        .await
        .map_err(error_response)?;
    Ok(Json(containers))
}

/// Submit a job
async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<JobSubmission>,
) -> ApiResult<Job> {
    if submission.id.trim().is_empty() {
        return Err(bad_request("job id must not be empty"));
    }
    if submission.image.trim().is_empty() {
        return Err(bad_request("image must not be empty"));
    }

    let job = state
        .controller
        .submit(submission)
        .await
        .map_err(error_response)?;
    Ok(Json(job))
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Job>> {
    let jobs = state.controller.list().await.map_err(error_response)?;
    Ok(Json(jobs))
}

async fn get_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Job> {
    let job = state.controller.get(&id).await.map_err(error_response)?;
    Ok(Json(job))
}

/// Re-run placement for a pending job
async fn dispatch_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Job> {
    let job = state.controller.dispatch(&id).await.map_err(error_response)?;
    Ok(Json(job))
}

/// Delete a job, best-effort removing its container
async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Removed> {
    state.controller.delete(&id).await.map_err(error_response)?;
    Ok(Json(Removed {
        status: "deleted".to_string(),
        id,
    }))
}

/// Active scheduling strategy and the accepted names
#[derive(Debug, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub strategy: SchedulingStrategy,
    pub available_strategies: Vec<SchedulingStrategy>,
}

/// Request to change the scheduling strategy
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateSchedulerRequest {
    pub strategy: String,
}

async fn get_scheduler_settings(State(state): State<Arc<AppState>>) -> Json<SchedulerSettings> {
    Json(SchedulerSettings {
        strategy: state.scheduler.get_strategy(),
        available_strategies: SchedulingStrategy::ALL.to_vec(),
    })
}

async fn update_scheduler_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateSchedulerRequest>,
) -> ApiResult<SchedulerSettings> {
    state
        .scheduler
        .set_strategy(&req.strategy)
        .map_err(error_response)?;

    Ok(get_scheduler_settings(State(state)).await)
}

/// Node counts by health
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NodeCounts {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub unknown: usize,
}

/// Job counts by status
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct JobCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// System status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub strategy: SchedulingStrategy,
    pub nodes: NodeCounts,
    pub jobs: JobCounts,
}

/// Get system status from cached node state and the job store
async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<StatusResponse> {
    let mut nodes = NodeCounts::default();
    for node in state.registry.list().await {
        nodes.total += 1;
        match node.status {
            NodeStatus::Online => nodes.online += 1,
            NodeStatus::Offline => nodes.offline += 1,
            NodeStatus::Unknown => nodes.unknown += 1,
        }
    }

    let mut jobs = JobCounts::default();
    for job in state.controller.list().await.map_err(error_response)? {
        jobs.total += 1;
        match job.status {
            JobStatus::Pending => jobs.pending += 1,
            JobStatus::Running => jobs.running += 1,
            JobStatus::Completed => jobs.completed += 1,
            JobStatus::Failed => jobs.failed += 1,
        }
    }

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        strategy: state.scheduler.get_strategy(),
        nodes,
        jobs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use fleet_network::testing::{spec, ScriptedAgent};
    use fleet_network::HealthPolicy;
    use fleet_store::MemoryCollection;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    struct TestApp {
        agent: Arc<ScriptedAgent>,
        router: Router,
    }

    fn app() -> TestApp {
        let agent = Arc::new(ScriptedAgent::new());
        let registry = Arc::new(NodeRegistry::new(agent.clone(), HealthPolicy::default()));
        let scheduler = Arc::new(Scheduler::default());
        let jobs: Arc<MemoryCollection<Job>> = Arc::new(MemoryCollection::new());
        let controller = Arc::new(JobController::new(
            registry.clone(),
            scheduler.clone(),
            agent.clone(),
            jobs,
        ));

        let router = create_router(AppState {
            registry,
            scheduler,
            controller,
            agent: agent.clone(),
        });
        TestApp { agent, router }
    }

    impl TestApp {
        async fn call(
            &self,
            method: Method,
            uri: &str,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, Vec<u8>) {
            let builder = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, bytes.to_vec())
        }

        async fn json<T: DeserializeOwned>(
            &self,
            method: Method,
            uri: &str,
            body: Option<serde_json::Value>,
        ) -> T {
            let (status, bytes) = self.call(method, uri, body).await;
            assert!(status.is_success(), "{} {}", status, String::from_utf8_lossy(&bytes));
            serde_json::from_slice(&bytes).unwrap()
        }
    }

    fn node_body(id: &str, port: u16) -> serde_json::Value {
        serde_json::to_value(spec(id, port)).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let health: HealthResponse = app.json(Method::GET, "/health", None).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.nodes, 0);
    }

    #[tokio::test]
    async fn test_node_lifecycle() {
        let app = app();
        app.agent.set_healthy(&spec("node1", 9001), 12.0, 34.0);

        let node: Node = app
            .json(Method::POST, "/api/v1/nodes", Some(node_body("node1", 9001)))
            .await;
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.cpu_percent, Some(12.0));

        let nodes: Vec<Node> = app.json(Method::GET, "/api/v1/nodes", None).await;
        assert_eq!(nodes.len(), 1);

        let node: Node = app.json(Method::GET, "/api/v1/nodes/node1", None).await;
        assert_eq!(node.id, "node1");

        let removed: Removed = app.json(Method::DELETE, "/api/v1/nodes/node1", None).await;
        assert_eq!(removed.status, "removed");

        let (status, _) = app.call(Method::DELETE, "/api/v1/nodes/node1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app.call(Method::GET, "/api/v1/nodes/node1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_id() {
        let app = app();
        let (status, _) = app
            .call(Method::POST, "/api/v1/nodes", Some(node_body("", 9001)))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ping_reports_diagnostics() {
        let app = app();
        let node1 = spec("node1", 9001);
        app.agent.set_failing(&node1, 503);
        app.json::<Node>(Method::POST, "/api/v1/nodes", Some(node_body("node1", 9001)))
            .await;

        let node: Node = app.json(Method::POST, "/api/v1/nodes/node1/ping", None).await;
        assert_eq!(node.status, NodeStatus::Offline);
        assert_eq!(node.last_http_code, Some(503));
        assert_eq!(node.heartbeat_failures, 2);

        let (status, _) = app.call(Method::POST, "/api/v1/nodes/nope/ping", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_node_containers() {
        let app = app();
        let node1 = spec("node1", 9001);
        app.agent.set_healthy(&node1, 1.0, 1.0);
        app.json::<Node>(Method::POST, "/api/v1/nodes", Some(node_body("node1", 9001)))
            .await;
        app.json::<Job>(
            Method::POST,
            "/api/v1/jobs",
            Some(serde_json::json!({"id": "1", "image": "busybox"})),
        )
        .await;

        let containers: Vec<ContainerInfo> = app
            .json(Method::GET, "/api/v1/nodes/node1/containers", None)
            .await;
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "job-1");

        app.agent.set_unreachable(&node1);
        let (status, _) = app
            .call(Method::GET, "/api/v1/nodes/node1/containers", None)
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let app = app();

        let job: Job = app
            .json(
                Method::POST,
                "/api/v1/jobs",
                Some(serde_json::json!({"id": "7", "image": "busybox", "command": "true"})),
            )
            .await;
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.node_id.is_none());

        let node1 = spec("node1", 9001);
        app.agent.set_healthy(&node1, 1.0, 1.0);
        app.json::<Node>(Method::POST, "/api/v1/nodes", Some(node_body("node1", 9001)))
            .await;

        let job: Job = app.json(Method::POST, "/api/v1/jobs/7/dispatch", None).await;
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.node_id.as_deref(), Some("node1"));

        let jobs: Vec<Job> = app.json(Method::GET, "/api/v1/jobs", None).await;
        assert_eq!(jobs.len(), 1);

        let removed: Removed = app.json(Method::DELETE, "/api/v1/jobs/7", None).await;
        assert_eq!(removed.status, "deleted");
        assert_eq!(app.agent.deleted().len(), 1);

        let (status, _) = app.call(Method::GET, "/api/v1/jobs/7", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app.call(Method::DELETE, "/api/v1/jobs/7", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_not_an_http_error() {
        let app = app();
        let node1 = spec("node1", 9001);
        app.agent.set_healthy(&node1, 1.0, 1.0);
        app.agent.reject_creates(&node1);
        app.json::<Node>(Method::POST, "/api/v1/nodes", Some(node_body("node1", 9001)))
            .await;

        let job: Job = app
            .json(
                Method::POST,
                "/api/v1/jobs",
                Some(serde_json::json!({"id": "1", "image": "busybox"})),
            )
            .await;
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_scheduler_settings() {
        let app = app();

        let settings: SchedulerSettings = app
            .json(Method::GET, "/api/v1/settings/scheduler", None)
            .await;
        assert_eq!(settings.strategy, SchedulingStrategy::FirstFit);
        assert_eq!(settings.available_strategies.len(), 3);

        let settings: SchedulerSettings = app
            .json(
                Method::PUT,
                "/api/v1/settings/scheduler",
                Some(serde_json::json!({"strategy": "round_robin"})),
            )
            .await;
        assert_eq!(settings.strategy, SchedulingStrategy::RoundRobin);

        let (status, body) = app
            .call(
                Method::PUT,
                "/api/v1/settings/scheduler",
                Some(serde_json::json!({"strategy": "bogus"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).contains("bogus"));

        let settings: SchedulerSettings = app
            .json(Method::GET, "/api/v1/settings/scheduler", None)
            .await;
        assert_eq!(settings.strategy, SchedulingStrategy::RoundRobin);
    }

    #[tokio::test]
    async fn test_status() {
        let app = app();
        app.agent.set_healthy(&spec("up", 9001), 1.0, 1.0);
        app.json::<Node>(Method::POST, "/api/v1/nodes", Some(node_body("up", 9001)))
            .await;
        app.json::<Node>(Method::POST, "/api/v1/nodes", Some(node_body("down", 9002)))
            .await;
        app.json::<Job>(
            Method::POST,
            "/api/v1/jobs",
            Some(serde_json::json!({"id": "1", "image": "busybox"})),
        )
        .await;

        let status: StatusResponse = app.json(Method::GET, "/api/v1/status", None).await;
        assert_eq!(status.nodes.total, 2);
        assert_eq!(status.nodes.online, 1);
        assert_eq!(status.nodes.offline, 1);
        assert_eq!(status.jobs.running, 1);
        assert_eq!(status.strategy, SchedulingStrategy::FirstFit);
    }

    #[test]
    fn test_error_response_mapping() {
        let cases = [
            (FleetError::JobNotFound("1".into()), StatusCode::NOT_FOUND),
            (FleetError::InvalidStrategy("x".into()), StatusCode::BAD_REQUEST),
            (FleetError::AlreadyExists("1".into()), StatusCode::CONFLICT),
            (FleetError::NodeUnreachable("n".into()), StatusCode::BAD_GATEWAY),
            (FleetError::StoreUnavailable("s".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(error_response(err).0, expected);
        }
    }
}
