//! CLI commands implementation

use anyhow::Result;
use fleet_core::{ContainerInfo, Job, Node, NodeSpec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// API client for communicating with the daemon
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode a successful JSON body
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error = response.text().await.unwrap_or_default();
            anyhow::bail!("{}: {}", status, error);
        }
        Ok(response.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.client.get(self.url(path))).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: Option<&B>) -> Result<T> {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.client.delete(self.url(path))).await
    }
}

/// Deletion acknowledgement
#[derive(Debug, Deserialize)]
pub struct Removed {
    pub status: String,
    pub id: String,
}

/// Scheduler settings response
#[derive(Debug, Deserialize)]
pub struct SchedulerSettings {
    pub strategy: String,
    pub available_strategies: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct NodeCounts {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub unknown: usize,
}

#[derive(Debug, Deserialize)]
pub struct JobCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Status response
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub strategy: String,
    pub nodes: NodeCounts,
    pub jobs: JobCounts,
}

/// Register or update a node
pub async fn register(client: &ApiClient, spec: NodeSpec) -> Result<()> {
    let node: Node = client.post("/api/v1/nodes", Some(&spec)).await?;
    println!("Node '{}' registered", node.id);
    print_node_details(&node);
    Ok(())
}

/// List nodes with live health
pub async fn nodes(client: &ApiClient) -> Result<()> {
    let nodes: Vec<Node> = client.get("/api/v1/nodes").await?;

    if nodes.is_empty() {
        println!("No nodes registered");
        return Ok(());
    }

    println!(
        "{:<16} {:<22} {:<8} {:>5} {:>8} {:>7} {:>7} {:>6}",
        "ID", "ENDPOINT", "STATUS", "CPU", "MEMORY", "CPU%", "MEM%", "FAILS"
    );
    println!("{}", "-".repeat(86));
    for node in nodes {
        println!(
            "{:<16} {:<22} {:<8} {:>5} {:>8} {:>7} {:>7} {:>6}",
            node.id,
            node.endpoint().to_string(),
            node.status.to_string(),
            node.cpu,
            format!("{}MB", node.memory),
            percent(node.cpu_percent),
            percent(node.memory_percent),
            node.heartbeat_failures
        );
    }

    Ok(())
}

/// Show one node
pub async fn node(client: &ApiClient, id: String) -> Result<()> {
    let node: Node = client.get(&format!("/api/v1/nodes/{}", id)).await?;
    print_node_details(&node);
    Ok(())
}

/// Force a heartbeat and show diagnostics
pub async fn ping(client: &ApiClient, id: String) -> Result<()> {
    let node: Node = client
        .post::<_, ()>(&format!("/api/v1/nodes/{}/ping", id), None)
        .await?;
    print_node_details(&node);
    println!(
        "  Last HTTP code: {}",
        node.last_http_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  Last error: {}", node.last_error.as_deref().unwrap_or("-"));
    Ok(())
}

/// Remove a node
pub async fn deregister(client: &ApiClient, id: String) -> Result<()> {
    let removed: Removed = client.delete(&format!("/api/v1/nodes/{}", id)).await?;
    println!("Node '{}' {}", removed.id, removed.status);
    Ok(())
}

/// List containers on a node
pub async fn containers(client: &ApiClient, node_id: String) -> Result<()> {
    let containers: Vec<ContainerInfo> = client
        .get(&format!("/api/v1/nodes/{}/containers", node_id))
        .await?;

    if containers.is_empty() {
        println!("No containers on node '{}'", node_id);
        return Ok(());
    }

    println!("{:<14} {:<24} {:<28} {:<20}", "ID", "NAME", "IMAGE", "STATUS");
    println!("{}", "-".repeat(86));
    for container in containers {
        println!(
            "{:<14} {:<24} {:<28} {:<20}",
            short_id(&container.id),
            container.normalized_name(),
            container.image,
            container.status
        );
    }

    Ok(())
}

/// Submit a job
pub async fn submit(
    client: &ApiClient,
    image: String,
    command: Option<String>,
    id: Option<String>,
) -> Result<()> {
    #[derive(Serialize)]
    struct SubmitRequest {
        id: String,
        image: String,
        command: Option<String>,
    }

    let req = SubmitRequest {
        id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        image,
        command,
    };

    let job: Job = client.post("/api/v1/jobs", Some(&req)).await?;
    println!("Job '{}' submitted", job.id);
    print_job_details(&job);
    Ok(())
}

/// List jobs
pub async fn jobs(client: &ApiClient) -> Result<()> {
    let jobs: Vec<Job> = client.get("/api/v1/jobs").await?;

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    println!(
        "{:<36} {:<24} {:<10} {:<16} {:<20}",
        "ID", "IMAGE", "STATUS", "NODE", "UPDATED"
    );
    println!("{}", "-".repeat(108));
    for job in jobs {
        println!(
            "{:<36} {:<24} {:<10} {:<16} {:<20}",
            job.id,
            job.image,
            job.status.to_string(),
            job.node_id.as_deref().unwrap_or("-"),
            job.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

/// Show one job
pub async fn job(client: &ApiClient, id: String) -> Result<()> {
    let job: Job = client.get(&format!("/api/v1/jobs/{}", id)).await?;
    print_job_details(&job);
    Ok(())
}

/// Retry placement of a pending job
pub async fn dispatch(client: &ApiClient, id: String) -> Result<()> {
    let job: Job = client
        .post::<_, ()>(&format!("/api/v1/jobs/{}/dispatch", id), None)
        .await?;
    print_job_details(&job);
    Ok(())
}

/// Delete a job
pub async fn delete(client: &ApiClient, id: String) -> Result<()> {
    let removed: Removed = client.delete(&format!("/api/v1/jobs/{}", id)).await?;
    println!("Job '{}' {}", removed.id, removed.status);
    Ok(())
}

/// Show or change the scheduling strategy
pub async fn strategy(client: &ApiClient, name: Option<String>) -> Result<()> {
    let settings: SchedulerSettings = match name {
        Some(strategy) => {
            #[derive(Serialize)]
            struct UpdateRequest {
                strategy: String,
            }

            client
                .send(
                    client
                        .client
                        .put(client.url("/api/v1/settings/scheduler"))
                        .json(&UpdateRequest { strategy }),
                )
                .await?
        }
        None => client.get("/api/v1/settings/scheduler").await?,
    };

    println!("Strategy: {}", settings.strategy);
    println!("Available: {}", settings.available_strategies.join(", "));
    Ok(())
}

/// Show system status
pub async fn top(client: &ApiClient) -> Result<()> {
    let status: StatusResponse = client.get("/api/v1/status").await?;

    println!("fleet v{}", status.version);
    println!();
    println!("Strategy: {}", status.strategy);
    println!(
        "Nodes: {} total, {} online, {} offline, {} unknown",
        status.nodes.total, status.nodes.online, status.nodes.offline, status.nodes.unknown
    );
    println!(
        "Jobs: {} total, {} pending, {} running, {} completed, {} failed",
        status.jobs.total,
        status.jobs.pending,
        status.jobs.running,
        status.jobs.completed,
        status.jobs.failed
    );
    Ok(())
}

fn percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| "-".to_string())
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn print_node_details(node: &Node) {
    println!("Node: {}", node.id);
    println!("  Endpoint: {}", node.endpoint());
    println!("  Capacity: {} CPU, {}MB", node.cpu, node.memory);
    println!("  Status: {}", node.status);
    println!(
        "  Load: CPU {}%, memory {}%",
        percent(node.cpu_percent),
        percent(node.memory_percent)
    );
    if let Some(last_seen) = node.last_seen {
        println!("  Last seen: {}", last_seen.to_rfc3339());
    }
    if node.heartbeat_failures > 0 {
        println!("  Heartbeat failures: {}", node.heartbeat_failures);
    }
}

fn print_job_details(job: &Job) {
    println!("Job: {}", job.id);
    println!("  Image: {}", job.image);
    if let Some(command) = &job.command {
        println!("  Command: {}", command);
    }
    println!("  Status: {}", job.status);
    println!("  Node: {}", job.node_id.as_deref().unwrap_or("-"));
    if let Some(container_id) = &job.container_id {
        println!("  Container: {}", short_id(container_id));
    }
    println!("  Created: {}", job.created_at.to_rfc3339());
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};

    async fn serve(router: Router) -> ApiClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        ApiClient::new(&format!("http://{}/", addr))
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:8000/");
        assert_eq!(client.url("/api/v1/jobs"), "http://localhost:8000/api/v1/jobs");
    }

    #[test]
    fn test_formatting_helpers() {
        assert_eq!(percent(Some(12.345)), "12.3");
        assert_eq!(percent(None), "-");
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }

    #[tokio::test]
    async fn test_send_decodes_success() {
        let router = Router::new().route(
            "/api/v1/settings/scheduler",
            get(|| async {
                Json(serde_json::json!({
                    "strategy": "round_robin",
                    "available_strategies": ["first_fit", "round_robin", "resource_aware"]
                }))
            }),
        );
        let client = serve(router).await;

        let settings: SchedulerSettings = client.get("/api/v1/settings/scheduler").await.unwrap();
        assert_eq!(settings.strategy, "round_robin");
        assert_eq!(settings.available_strategies.len(), 3);
    }

    #[tokio::test]
    async fn test_send_reports_error_body() {
        let router = Router::new().route(
            "/api/v1/jobs/:id",
            get(|| async { (StatusCode::NOT_FOUND, "Job not found: 9") }),
        );
        let client = serve(router).await;

        let err = client.get::<Job>("/api/v1/jobs/9").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("404"), "{}", message);
        assert!(message.contains("Job not found: 9"), "{}", message);
    }
}
