//! fleet node agent
//!
//! Runs on every worker node. Reports host load on `/health` and manages
//! containers through the Docker CLI on behalf of the control plane.

mod host;
mod routes;

use anyhow::Context;
use clap::Parser;
use fleet_core::{AgentConfig, LogFormat, LoggingConfig};
use fleet_runtime::{ContainerRuntime, DockerCliConfig, DockerCliRuntime};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use routes::{create_router, AgentState};

/// fleet-agent - node agent for the fleet orchestrator
#[derive(Parser, Debug)]
#[command(name = "fleet-agent")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the agent API
    #[arg(long)]
    address: Option<String>,

    /// Port for the agent API
    #[arg(long)]
    port: Option<u16>,

    /// Docker CLI binary
    #[arg(long)]
    docker: Option<PathBuf>,

    /// Log level or filter directive
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => AgentConfig::default(),
        };

        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(docker) = self.docker {
            config.docker_binary = docker;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }

        Ok(config)
    }
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("invalid log level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to set subscriber: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    init_logging(&config.logging)?;

    info!("Starting fleet agent v{}", env!("CARGO_PKG_VERSION"));

    let runtime = DockerCliRuntime::new(DockerCliConfig {
        binary: config.docker_binary.clone(),
        stop_timeout_secs: config.stop_timeout_secs,
        ..DockerCliConfig::default()
    });
    if !runtime.ping().await {
        warn!(
            runtime = runtime.name(),
            "Container engine is not reachable, container calls will fail until it is"
        );
    }

    let router = create_router(AgentState {
        runtime: Arc::new(runtime),
        cpu_sample_window: Duration::from_millis(200),
    })
    .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.address, config.port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(address = %addr, "Agent listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received SIGINT, shutting down"),
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGINT handler");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
        .context("server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from(["fleet-agent", "--port", "9001", "--docker", "/usr/bin/podman"]);
        let config = args.into_config().unwrap();

        assert_eq!(config.port, 9001);
        assert_eq!(config.docker_binary, PathBuf::from("/usr/bin/podman"));
        assert_eq!(config.stop_timeout_secs, 5);
    }
}
