//! Node, Job, and Container type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::FleetError;

/// Static description of a worker node, supplied at registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Caller-supplied unique identifier
    pub id: String,
    /// Address of the node agent
    pub ip: String,
    /// Port of the node agent
    pub port: u16,
    /// CPU core count
    pub cpu: u32,
    /// Memory in MB
    pub memory: u64,
}

/// A registered worker node with its latest observed health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub ip: String,
    pub port: u16,
    pub cpu: u32,
    pub memory: u64,
    /// Health status, only changed by a health refresh
    pub status: NodeStatus,
    /// CPU load reported by the last successful heartbeat
    pub cpu_percent: Option<f64>,
    /// Memory load reported by the last successful heartbeat
    pub memory_percent: Option<f64>,
    /// Time of the last successful heartbeat
    pub last_seen: Option<DateTime<Utc>>,
    /// Consecutive failed heartbeats
    pub heartbeat_failures: u32,
    /// HTTP code of the most recent probe, if one was received
    pub last_http_code: Option<u16>,
    /// Error class and message of the most recent failed probe
    pub last_error: Option<String>,
}

impl Node {
    /// Create a node in the `unknown` state from its static spec
    pub fn from_spec(spec: NodeSpec) -> Self {
        Self {
            id: spec.id,
            ip: spec.ip,
            port: spec.port,
            cpu: spec.cpu,
            memory: spec.memory,
            status: NodeStatus::Unknown,
            cpu_percent: None,
            memory_percent: None,
            last_seen: None,
            heartbeat_failures: 0,
            last_http_code: None,
            last_error: None,
        }
    }

    /// Agent endpoint of the node
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.ip.clone(), self.port)
    }

    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }
}

/// Node health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Registered but not yet probed
    Unknown,
    /// Last heartbeat succeeded (or failed within the grace window)
    Online,
    /// Heartbeats have been failing beyond the grace window
    Offline,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Unknown => write!(f, "unknown"),
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Network endpoint of a node agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    /// Get the base URL for this endpoint
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A unit of work requesting one container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Caller-supplied unique identifier
    pub id: String,
    /// Container image
    pub image: String,
    /// Optional command run inside the container
    #[serde(default)]
    pub command: Option<String>,
    /// Node the job was placed on
    #[serde(default)]
    pub node_id: Option<String>,
    pub status: JobStatus,
    /// Container id reported by the node agent at dispatch
    #[serde(default)]
    pub container_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job
    pub fn new(id: String, image: String, command: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            image,
            command,
            node_id: None,
            status: JobStatus::Pending,
            container_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deterministic name of the container backing this job
    pub fn container_name(&self) -> String {
        container_name_for(&self.id)
    }

    /// Move the job to a new status, stamping `updated_at`
    pub fn transition(&mut self, status: JobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Container name for a job id (`job-<id>`)
pub fn container_name_for(job_id: &str) -> String {
    format!("job-{}", job_id)
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// No node was available, or placement has not been attempted
    Pending,
    /// The container was created on a node
    Running,
    /// The container exited successfully
    Completed,
    /// Dispatch failed or the container exited with an error
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Request to create a container on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRequest {
    pub image: String,
    pub name: String,
    #[serde(default)]
    pub command: Option<String>,
}

/// Normalized container descriptor returned by every runtime and agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Native status string of the container engine
    pub status: String,
    #[serde(default)]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ContainerInfo {
    /// Name without the leading `/` some engines report
    pub fn normalized_name(&self) -> &str {
        self.name.trim_start_matches('/')
    }

    /// Whether the engine reports the container as exited
    pub fn is_exited(&self) -> bool {
        let status = self.status.trim().to_ascii_lowercase();
        status == "exited" || status.starts_with("exited ")
    }

    /// Exit code, from the explicit field or the `Exited (N)` status text
    pub fn exit_indicator(&self) -> Option<i64> {
        self.exit_code.or_else(|| {
            let status = self.status.trim().to_ascii_lowercase();
            let rest = status.strip_prefix("exited (")?;
            let end = rest.find(')')?;
            rest[..end].trim().parse().ok()
        })
    }

    /// Whether an exited container finished successfully
    ///
    /// A container with no recoverable exit indicator counts as failed.
    pub fn exited_successfully(&self) -> bool {
        self.exit_indicator() == Some(0)
    }
}

/// Body of a node agent `GET /health` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthReport {
    pub status: String,
    pub hostname: Option<String>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub cpu_count: Option<u32>,
    pub memory_total_mb: Option<u64>,
}

/// Job placement strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStrategy {
    /// First healthy node in registry order
    #[default]
    FirstFit,
    /// Cycle through healthy nodes
    RoundRobin,
    /// Healthy node with the lowest CPU load
    ResourceAware,
}

impl SchedulingStrategy {
    /// Every recognized strategy
    pub const ALL: [SchedulingStrategy; 3] = [
        SchedulingStrategy::FirstFit,
        SchedulingStrategy::RoundRobin,
        SchedulingStrategy::ResourceAware,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulingStrategy::FirstFit => "first_fit",
            SchedulingStrategy::RoundRobin => "round_robin",
            SchedulingStrategy::ResourceAware => "resource_aware",
        }
    }
}

impl std::fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulingStrategy {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| FleetError::InvalidStrategy(s.to_string()))
    }
}
