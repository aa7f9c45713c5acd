//! fleet daemon
//!
//! Control-plane process: serves the REST API, monitors node health, and
//! reconciles job state.

mod shutdown;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::Router;
use clap::Parser;
use fleet_api::{create_router, AppState};
use fleet_core::{
    ApiConfig, DaemonConfig, Job, LogFormat, LoggingConfig, NodeSpec, SchedulingStrategy,
};
use fleet_network::{HealthMonitor, HealthPolicy, HttpAgentClient, NodeAgent, NodeRegistry};
use fleet_scheduler::{JobController, Reconciler, Scheduler};
use fleet_store::{Collection, JsonFileCollection, MemoryCollection};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// fleetd - minimal cluster orchestrator control plane
#[derive(Parser, Debug)]
#[command(name = "fleetd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the API server
    #[arg(long)]
    address: Option<String>,

    /// Port for the REST API server
    #[arg(long)]
    port: Option<u16>,

    /// Directory for persisted jobs and nodes (in-memory when unset)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Scheduling strategy at startup (first_fit, round_robin, resource_aware)
    #[arg(long)]
    strategy: Option<SchedulingStrategy>,

    /// Log level or filter directive
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Load the config file, if any, and apply command-line overrides
    fn into_config(self) -> anyhow::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => DaemonConfig::default(),
        };

        if let Some(address) = self.address {
            config.api.address = address;
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if let Some(data_dir) = self.data_dir {
            config.storage.data_dir = Some(data_dir);
        }
        if let Some(strategy) = self.strategy {
            config.scheduler.strategy = strategy;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }

        Ok(config)
    }
}

/// Install the global subscriber; `RUST_LOG` takes precedence over the config
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

struct Stores {
    jobs: Arc<dyn Collection<Job>>,
    nodes: Option<Arc<dyn Collection<NodeSpec>>>,
}

async fn open_stores(data_dir: Option<&Path>) -> anyhow::Result<Stores> {
    let Some(dir) = data_dir else {
        warn!("No data directory configured, jobs are kept in memory only");
        return Ok(Stores {
            jobs: Arc::new(MemoryCollection::<Job>::new()),
            nodes: None,
        });
    };

    let jobs = JsonFileCollection::<Job>::open(dir.join("jobs.json"))
        .await
        .context("opening job store")?;
    let nodes = JsonFileCollection::<NodeSpec>::open(dir.join("nodes.json"))
        .await
        .context("opening node store")?;
    info!(data_dir = %dir.display(), "Using file-backed storage");

    Ok(Stores {
        jobs: Arc::new(jobs),
        nodes: Some(Arc::new(nodes)),
    })
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    init_logging(&config.logging)?;

    info!("Starting fleet daemon v{}", env!("CARGO_PKG_VERSION"));

    let stores = open_stores(config.storage.data_dir.as_deref()).await?;

    let agent: Arc<dyn NodeAgent> = Arc::new(HttpAgentClient::new(
        config.health.timeout(),
        config.dispatch.timeout(),
    )?);

    let mut registry = NodeRegistry::new(
        agent.clone(),
        HealthPolicy::new(config.health.grace_period()),
    );
    if let Some(nodes) = stores.nodes.clone() {
        registry = registry.with_store(nodes);
    }
    let registry = Arc::new(registry);
    registry.restore().await.context("restoring nodes")?;

    let scheduler = Arc::new(Scheduler::new(config.scheduler.strategy));
    let controller = Arc::new(JobController::new(
        registry.clone(),
        scheduler.clone(),
        agent.clone(),
        stores.jobs.clone(),
    ));

    let monitor = HealthMonitor::new(registry.clone(), config.health.interval()).spawn();
    let reconciler = Arc::new(Reconciler::new(
        registry.clone(),
        agent.clone(),
        controller.clone(),
        config.reconcile.retention(),
    ))
    .spawn(config.reconcile.interval());

    let mut router: Router = create_router(AppState {
        registry,
        scheduler,
        controller,
        agent,
    });
    if config.api.cors_enabled {
        router = router.layer(cors_layer(&config.api));
    }
    let router = router.layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.api.address, config.api.port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(
        address = %addr,
        strategy = %config.scheduler.strategy,
        "API server listening"
    );

    let shutdown = shutdown::install_shutdown_handler();
    let drain = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { drain.cancelled().await })
        .await
        .context("server error")?;

    info!("API server stopped, stopping background loops");
    let timeout = config.shutdown_timeout();
    let (monitor_stopped, reconciler_stopped) =
        tokio::join!(monitor.shutdown(timeout), reconciler.shutdown(timeout));
    if !(monitor_stopped && reconciler_stopped) {
        warn!("Some background loops were aborted");
    }

    info!("Shutdown complete");
    Ok(())
}
