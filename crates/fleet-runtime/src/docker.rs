//! Docker CLI runtime implementation
//!
//! Drives the `docker` binary as a child process. Listing uses
//! `docker ps -q` followed by one `docker inspect` call so that exit codes and
//! finish times are available for every container. Containers removed between
//! the two calls are left out of the listing.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use fleet_core::{ContainerInfo, ContainerRequest, FleetError, FleetResult};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::traits::ContainerRuntime;

/// Docker CLI runtime configuration
#[derive(Debug, Clone)]
pub struct DockerCliConfig {
    /// Path to the docker binary
    pub binary: PathBuf,
    /// Seconds `docker stop` waits before killing the container
    pub stop_timeout_secs: u64,
    /// Upper bound for `docker run`, which may include an image pull
    pub run_timeout: Duration,
    /// Upper bound for every other docker invocation
    pub command_timeout: Duration,
}

impl Default for DockerCliConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("docker"),
            stop_timeout_secs: 5,
            run_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(10),
        }
    }
}

/// Container runtime backed by the Docker CLI
pub struct DockerCliRuntime {
    config: DockerCliConfig,
}

impl DockerCliRuntime {
    /// Create a new Docker CLI runtime
    pub fn new(config: DockerCliConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Build the `docker run` command for a container request
    fn build_run_command(&self, request: &ContainerRequest) -> Command {
        let mut cmd = self.command();
        cmd.arg("run").arg("-d");
        cmd.arg("--name").arg(&request.name);
        cmd.arg(&request.image);

        if let Some(command) = &request.command {
            cmd.args(command.split_whitespace());
        }

        cmd
    }

    fn build_ps_command(&self, all: bool) -> Command {
        let mut cmd = self.command();
        cmd.arg("ps").arg("-q").arg("--no-trunc");
        if all {
            cmd.arg("-a");
        }
        cmd
    }

    async fn run(&self, mut cmd: Command, timeout: Duration) -> FleetResult<Output> {
        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(FleetError::Runtime(format!(
                "Failed to execute {}: {}",
                self.config.binary.display(),
                e
            ))),
            Err(_) => Err(FleetError::Runtime(format!(
                "{} did not finish within {}s",
                self.config.binary.display(),
                timeout.as_secs()
            ))),
        }
    }

    async fn inspect(&self, ids: &[String]) -> FleetResult<Vec<ContainerInfo>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = self.command();
        cmd.arg("inspect").args(ids);

        let output = self.run(cmd, self.config.command_timeout).await?;
        inspect_output(&output)
    }
}

/// Records from a `docker inspect` run over listed ids
///
/// Docker exits non-zero when any id is gone but still prints the records it
/// found, so a vanished container only shrinks the result.
fn inspect_output(output: &Output) -> FleetResult<Vec<ContainerInfo>> {
    if output.status.success() {
        return parse_inspect(&output.stdout);
    }

    match rejection("docker inspect", output) {
        FleetError::ContainerNotFound(stderr) => {
            let found = parse_inspect(&output.stdout).unwrap_or_default();
            debug!(found = found.len(), error = %stderr, "Containers vanished while listing");
            Ok(found)
        }
        e => Err(e),
    }
}

/// Map a failed docker invocation to an error
fn rejection(what: &str, output: &Output) -> FleetError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if stderr.contains("No such container") || stderr.contains("No such object") {
        FleetError::ContainerNotFound(stderr)
    } else if stderr.contains("Cannot connect to the Docker daemon") {
        FleetError::Runtime(stderr)
    } else {
        FleetError::DispatchFailed(format!("{} failed: {}", what, stderr))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    config: InspectConfig,
    #[serde(default)]
    state: InspectState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InspectConfig {
    image: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InspectState {
    status: String,
    exit_code: i64,
    finished_at: String,
}

/// Parse `docker inspect` output into normalized descriptors
fn parse_inspect(stdout: &[u8]) -> FleetResult<Vec<ContainerInfo>> {
    let records: Vec<InspectRecord> = serde_json::from_slice(stdout)?;

    Ok(records
        .into_iter()
        .map(|record| {
            let exited = record.state.status == "exited";
            ContainerInfo {
                id: record.id,
                name: record.name.trim_start_matches('/').to_string(),
                image: if record.config.image.is_empty() {
                    "<none>".to_string()
                } else {
                    record.config.image
                },
                exit_code: exited.then_some(record.state.exit_code),
                finished_at: if exited {
                    parse_finished_at(&record.state.finished_at)
                } else {
                    None
                },
                status: record.state.status,
            }
        })
        .collect())
}

/// Docker reports `0001-01-01T00:00:00Z` for containers that never finished
fn parse_finished_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
        .filter(|t| t.year() > 1)
}

#[async_trait]
impl ContainerRuntime for DockerCliRuntime {
    async fn create(&self, request: &ContainerRequest) -> FleetResult<ContainerInfo> {
        info!(
            name = %request.name,
            image = %request.image,
            "Starting container"
        );

        let cmd = self.build_run_command(request);
        let output = self.run(cmd, self.config.run_timeout).await?;

        if !output.status.success() {
            let err = rejection("docker run", &output);
            error!(name = %request.name, error = %err, "Failed to start container");
            return Err(err);
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(name = %request.name, container_id = %id, "Container started");

        self.inspect(&[id.clone()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FleetError::ContainerNotFound(id))
    }

    async fn list(&self, all: bool) -> FleetResult<Vec<ContainerInfo>> {
        let cmd = self.build_ps_command(all);
        let output = self.run(cmd, self.config.command_timeout).await?;

        if !output.status.success() {
            return Err(rejection("docker ps", &output));
        }

        let ids: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        self.inspect(&ids).await
    }

    async fn remove(&self, name_or_id: &str) -> FleetResult<()> {
        info!(container = %name_or_id, "Removing container");

        let mut stop = self.command();
        stop.arg("stop")
            .arg("-t")
            .arg(self.config.stop_timeout_secs.to_string())
            .arg(name_or_id);
        let stop_budget =
            self.config.command_timeout + Duration::from_secs(self.config.stop_timeout_secs);
        if let Err(e) = self.run(stop, stop_budget).await {
            warn!(container = %name_or_id, error = %e, "docker stop failed, forcing removal");
        }

        let mut rm = self.command();
        rm.arg("rm").arg("-f").arg(name_or_id);
        let output = self.run(rm, self.config.command_timeout).await?;

        if !output.status.success() {
            return Err(rejection("docker rm", &output));
        }

        Ok(())
    }

    async fn ping(&self) -> bool {
        let mut cmd = self.command();
        cmd.arg("info");
        match self.run(cmd, Duration::from_secs(5)).await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "docker-cli"
    }
}
