//! Scripted `NodeAgent` for tests
//!
//! Nodes are keyed by endpoint. An endpoint nobody scripted behaves like a
//! host that refuses connections.

use async_trait::async_trait;
use fleet_core::{
    ContainerInfo, ContainerRequest, Endpoint, FleetError, FleetResult, NodeSpec,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::agent::NodeAgent;
use crate::health::ProbeOutcome;

/// Node spec on 127.0.0.1 with a fixed capacity
pub fn spec(id: &str, port: u16) -> NodeSpec {
    NodeSpec {
        id: id.to_string(),
        ip: "127.0.0.1".to_string(),
        port,
        cpu: 4,
        memory: 8192,
    }
}

fn key(endpoint: &Endpoint) -> String {
    endpoint.to_string()
}

fn spec_key(spec: &NodeSpec) -> String {
    format!("{}:{}", spec.ip, spec.port)
}

#[derive(Default)]
struct NodeScript {
    health: Option<ProbeOutcome>,
    unreachable: bool,
    reject_creates: bool,
    create_delay: Option<Duration>,
    containers: Vec<ContainerInfo>,
}

#[derive(Default)]
struct ScriptState {
    nodes: HashMap<String, NodeScript>,
    created: Vec<(String, ContainerRequest)>,
    deleted: Vec<(String, String)>,
    probes: usize,
}

/// In-process node agent whose responses are set by the test
#[derive(Default)]
pub struct ScriptedAgent {
    state: Mutex<ScriptState>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_node(&self, spec: &NodeSpec, f: impl FnOnce(&mut NodeScript)) {
        let mut state = self.state();
        f(state.nodes.entry(spec_key(spec)).or_default());
    }

    /// Answer health probes with 200 and the given load
    pub fn set_healthy(&self, spec: &NodeSpec, cpu_percent: f64, memory_percent: f64) {
        self.with_node(spec, |node| {
            node.unreachable = false;
            node.health = Some(ProbeOutcome::Healthy {
                http_code: 200,
                cpu_percent,
                memory_percent,
            });
        });
    }

    /// Answer health probes with the given HTTP status
    pub fn set_failing(&self, spec: &NodeSpec, http_code: u16) {
        self.with_node(spec, |node| {
            node.health = Some(ProbeOutcome::Failed {
                http_code: Some(http_code),
                error: format!("http_status: {}", http_code),
            });
        });
    }

    /// Refuse every connection to the node
    pub fn set_unreachable(&self, spec: &NodeSpec) {
        self.with_node(spec, |node| node.unreachable = true);
    }

    /// Reject container creation with a non-2xx response
    pub fn reject_creates(&self, spec: &NodeSpec) {
        self.with_node(spec, |node| node.reject_creates = true);
    }

    /// Hold every create call on the node for `delay` before answering
    pub fn delay_creates(&self, spec: &NodeSpec, delay: Duration) {
        self.with_node(spec, |node| node.create_delay = Some(delay));
    }

    /// Replace the node's container listing
    pub fn set_containers(&self, spec: &NodeSpec, containers: Vec<ContainerInfo>) {
        self.with_node(spec, |node| node.containers = containers);
    }

    /// Every create request issued, as `(endpoint, request)`
    pub fn created(&self) -> Vec<(String, ContainerRequest)> {
        self.state().created.clone()
    }

    /// Every delete request issued, as `(endpoint, name_or_id)`
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.state().deleted.clone()
    }

    pub fn probe_count(&self) -> usize {
        self.state().probes
    }
}

fn refused(endpoint: &Endpoint) -> FleetError {
    FleetError::NodeUnreachable(format!("{} (connect_error): connection refused", endpoint))
}

#[async_trait]
impl NodeAgent for ScriptedAgent {
    async fn health(&self, endpoint: &Endpoint) -> ProbeOutcome {
        let mut state = self.state();
        state.probes += 1;

        match state.nodes.get(&key(endpoint)) {
            Some(node) if !node.unreachable => node.health.clone().unwrap_or(ProbeOutcome::Failed {
                http_code: None,
                error: "connect_error: connection refused".to_string(),
            }),
            _ => ProbeOutcome::Failed {
                http_code: None,
                error: "connect_error: connection refused".to_string(),
            },
        }
    }

    async fn create_container(
        &self,
        endpoint: &Endpoint,
        request: &ContainerRequest,
    ) -> FleetResult<ContainerInfo> {
        let delay = {
            let mut state = self.state();
            state.created.push((key(endpoint), request.clone()));
            state
                .nodes
                .get(&key(endpoint))
                .and_then(|node| node.create_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();

        let node = match state.nodes.get_mut(&key(endpoint)) {
            Some(node) if !node.unreachable => node,
            _ => return Err(refused(endpoint)),
        };
        if node.reject_creates {
            return Err(FleetError::DispatchFailed(format!(
                "{} create container returned 500 Internal Server Error",
                endpoint
            )));
        }

        if node
            .containers
            .iter()
            .any(|c| c.normalized_name() == request.name)
        {
            return Err(FleetError::DispatchFailed(format!(
                "{} create container returned 409 Conflict: name {} is already in use",
                endpoint, request.name
            )));
        }

        let info = ContainerInfo {
            id: format!("c-{}", request.name),
            name: request.name.clone(),
            image: request.image.clone(),
            status: "running".to_string(),
            exit_code: None,
            finished_at: None,
        };
        node.containers.push(info.clone());
        Ok(info)
    }

    async fn list_containers(
        &self,
        endpoint: &Endpoint,
        all: bool,
    ) -> FleetResult<Vec<ContainerInfo>> {
        let state = self.state();
        match state.nodes.get(&key(endpoint)) {
            Some(node) if !node.unreachable => Ok(node
                .containers
                .iter()
                .filter(|c| all || !c.is_exited())
                .cloned()
                .collect()),
            _ => Err(refused(endpoint)),
        }
    }

    async fn delete_container(&self, endpoint: &Endpoint, name_or_id: &str) -> FleetResult<()> {
        let mut state = self.state();
        state.deleted.push((key(endpoint), name_or_id.to_string()));

        let node = match state.nodes.get_mut(&key(endpoint)) {
            Some(node) if !node.unreachable => node,
            _ => return Err(refused(endpoint)),
        };

        let before = node.containers.len();
        node.containers
            .retain(|c| c.normalized_name() != name_or_id && c.id != name_or_id);
        if node.containers.len() == before {
            return Err(FleetError::ContainerNotFound(format!(
                "{} on {}",
                name_or_id, endpoint
            )));
        }
        Ok(())
    }
}
