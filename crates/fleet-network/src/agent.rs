//! Client side of the node agent contract
//!
//! Every node runs an agent exposing `GET /health` and a small container API.
//! `NodeAgent` is the seam the registry, job controller, and reconciler use;
//! `HttpAgentClient` implements it over HTTP with reqwest.

use async_trait::async_trait;
use fleet_core::{
    ContainerInfo, ContainerRequest, Endpoint, FleetError, FleetResult, HealthReport,
};
use std::time::Duration;
use tracing::debug;

use crate::health::ProbeOutcome;

/// Operations the control plane performs against a node agent
#[async_trait]
pub trait NodeAgent: Send + Sync {
    /// Probe the agent's health endpoint. Never fails: every failure is
    /// folded into the returned outcome.
    async fn health(&self, endpoint: &Endpoint) -> ProbeOutcome;

    /// Create and start a container
    async fn create_container(
        &self,
        endpoint: &Endpoint,
        request: &ContainerRequest,
    ) -> FleetResult<ContainerInfo>;

    /// List containers, including stopped ones when `all` is set
    async fn list_containers(&self, endpoint: &Endpoint, all: bool)
        -> FleetResult<Vec<ContainerInfo>>;

    /// Stop and remove a container by name or id
    async fn delete_container(&self, endpoint: &Endpoint, name_or_id: &str) -> FleetResult<()>;
}

/// HTTP implementation of [`NodeAgent`]
pub struct HttpAgentClient {
    /// Client for health probes (short timeout)
    probe_client: reqwest::Client,
    /// Client for container calls (long timeout, covers image pulls)
    dispatch_client: reqwest::Client,
    probe_timeout: Duration,
    dispatch_timeout: Duration,
}

impl HttpAgentClient {
    /// Create a new agent client
    pub fn new(probe_timeout: Duration, dispatch_timeout: Duration) -> FleetResult<Self> {
        let build = |timeout: Duration| {
            reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| FleetError::Internal(format!("Failed to create HTTP client: {}", e)))
        };

        Ok(Self {
            probe_client: build(probe_timeout)?,
            dispatch_client: build(dispatch_timeout)?,
            probe_timeout,
            dispatch_timeout,
        })
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn dispatch_timeout(&self) -> Duration {
        self.dispatch_timeout
    }
}

/// Short class name for a transport error, recorded in `last_error`
fn error_class(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect_error"
    } else if err.is_decode() {
        "decode_error"
    } else if err.is_request() {
        "request_error"
    } else {
        "error"
    }
}

fn unreachable(endpoint: &Endpoint, err: &reqwest::Error) -> FleetError {
    FleetError::NodeUnreachable(format!("{} ({}): {}", endpoint, error_class(err), err))
}

/// Turn a non-2xx agent response into an error
async fn rejection(endpoint: &Endpoint, what: &str, response: reqwest::Response) -> FleetError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    FleetError::DispatchFailed(format!("{} {} returned {}: {}", endpoint, what, status, body))
}

#[async_trait]
impl NodeAgent for HttpAgentClient {
    async fn health(&self, endpoint: &Endpoint) -> ProbeOutcome {
        let url = format!("{}/health", endpoint.url());

        match self.probe_client.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    return ProbeOutcome::Failed {
                        http_code: Some(status.as_u16()),
                        error: format!("http_status: {}", status),
                    };
                }

                // A malformed body still proves the agent is alive.
                let report = match response.json::<HealthReport>().await {
                    Ok(report) => report,
                    Err(e) => {
                        debug!(endpoint = %url, error = %e, "Unparseable health body");
                        HealthReport::default()
                    }
                };

                ProbeOutcome::Healthy {
                    http_code: status.as_u16(),
                    cpu_percent: report.cpu_percent,
                    memory_percent: report.memory_percent,
                }
            }
            Err(e) => ProbeOutcome::Failed {
                http_code: e.status().map(|s| s.as_u16()),
                error: format!("{}: {}", error_class(&e), e),
            },
        }
    }

    async fn create_container(
        &self,
        endpoint: &Endpoint,
        request: &ContainerRequest,
    ) -> FleetResult<ContainerInfo> {
        let url = format!("{}/containers", endpoint.url());
        let mut query = vec![
            ("image", request.image.as_str()),
            ("name", request.name.as_str()),
        ];
        if let Some(command) = &request.command {
            query.push(("command", command.as_str()));
        }

        let response = self
            .dispatch_client
            .post(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| unreachable(endpoint, &e))?;

        if !response.status().is_success() {
            return Err(rejection(endpoint, "create container", response).await);
        }

        response.json::<ContainerInfo>().await.map_err(|e| {
            FleetError::DispatchFailed(format!("{} returned an invalid container: {}", endpoint, e))
        })
    }

    async fn list_containers(
        &self,
        endpoint: &Endpoint,
        all: bool,
    ) -> FleetResult<Vec<ContainerInfo>> {
        let url = format!("{}/containers", endpoint.url());

        let response = self
            .dispatch_client
            .get(&url)
            .query(&[("all", all)])
            .send()
            .await
            .map_err(|e| unreachable(endpoint, &e))?;

        if !response.status().is_success() {
            return Err(rejection(endpoint, "list containers", response).await);
        }

        response.json::<Vec<ContainerInfo>>().await.map_err(|e| {
            FleetError::DispatchFailed(format!("{} returned an invalid listing: {}", endpoint, e))
        })
    }

    async fn delete_container(&self, endpoint: &Endpoint, name_or_id: &str) -> FleetResult<()> {
        let url = format!("{}/containers/{}", endpoint.url(), name_or_id);

        let response = self
            .dispatch_client
            .delete(&url)
            .send()
            .await
            .map_err(|e| unreachable(endpoint, &e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FleetError::ContainerNotFound(format!(
                "{} on {}",
                name_or_id, endpoint
            )));
        }
        if !response.status().is_success() {
            return Err(rejection(endpoint, "delete container", response).await);
        }

        Ok(())
    }
}
