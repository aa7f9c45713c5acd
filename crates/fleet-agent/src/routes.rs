//! Node agent HTTP surface

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get},
    Router,
};
use fleet_core::{ContainerInfo, ContainerRequest, FleetError, HealthReport};
use fleet_runtime::ContainerRuntime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::host;

/// State shared by the agent handlers
pub struct AgentState {
    pub runtime: Arc<dyn ContainerRuntime>,
    /// Window over which CPU load is measured for `/health`
    pub cpu_sample_window: Duration,
}

type AgentResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Create the agent router
pub fn create_router(state: AgentState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/containers", get(list_containers).post(create_container))
        .route("/containers/:id", delete(delete_container))
        .with_state(Arc::new(state))
}

fn error_response(err: FleetError) -> (StatusCode, String) {
    let status = match &err {
        FleetError::ContainerNotFound(_) => StatusCode::NOT_FOUND,
        FleetError::DispatchFailed(_) => StatusCode::BAD_REQUEST,
        FleetError::Runtime(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

/// Report host load
async fn health(State(state): State<Arc<AgentState>>) -> Json<HealthReport> {
    let load = host::sample(state.cpu_sample_window).await;

    Json(HealthReport {
        status: "ok".to_string(),
        hostname: host::hostname(),
        cpu_percent: load.cpu_percent,
        memory_percent: load.memory_percent,
        cpu_count: Some(load.cpu_count),
        memory_total_mb: Some(load.memory_total_mb),
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateQuery {
    pub image: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

/// Create and start a container
async fn create_container(
    State(state): State<Arc<AgentState>>,
    Query(query): Query<CreateQuery>,
) -> AgentResult<ContainerInfo> {
    if query.image.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "image must not be empty".to_string()));
    }

    let request = ContainerRequest {
        name: query
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(generated_name),
        image: query.image,
        command: query.command.filter(|command| !command.trim().is_empty()),
    };

    let container = state
        .runtime
        .create(&request)
        .await
        .map_err(error_response)?;
    Ok(Json(container))
}

fn generated_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("fleet-{}", &id[..12])
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub all: bool,
}

/// List containers on this node
async fn list_containers(
    State(state): State<Arc<AgentState>>,
    Query(query): Query<ListQuery>,
) -> AgentResult<Vec<ContainerInfo>> {
    let containers = state
        .runtime
        .list(query.all)
        .await
        .map_err(error_response)?;
    Ok(Json(containers))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemovedContainer {
    pub status: String,
    pub id: String,
}

/// Stop and remove a container
async fn delete_container(
    State(state): State<Arc<AgentState>>,
    Path(id): Path<String>,
) -> AgentResult<RemovedContainer> {
    info!(container = %id, "Delete requested");
    state.runtime.remove(&id).await.map_err(error_response)?;

    Ok(Json(RemovedContainer {
        status: "removed".to_string(),
        id,
    }))
}
