//! Configuration types for fleet

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::model::SchedulingStrategy;

/// Control-plane daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// API server configuration
    pub api: ApiConfig,
    /// Node health monitoring
    pub health: HealthConfig,
    /// Container dispatch to node agents
    pub dispatch: DispatchConfig,
    /// Job reconciliation loop
    pub reconcile: ReconcileConfig,
    /// Scheduler configuration
    pub scheduler: SchedulerConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Upper bound on waiting for background loops at shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            health: HealthConfig::default(),
            dispatch: DispatchConfig::default(),
            reconcile: ReconcileConfig::default(),
            scheduler: SchedulerConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            shutdown_timeout_secs: 10,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::FleetError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::FleetError::Config(format!("Failed to read config file: {}", e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, crate::FleetError> {
        toml::from_str(content)
            .map_err(|e| crate::FleetError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to bind the REST API server
    pub address: String,
    /// Port for the REST API server
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8000,
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Node health monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between background refresh passes
    pub interval_secs: u64,
    /// Timeout for a single health probe
    pub timeout_secs: u64,
    /// Failed probes within this window of the last success do not flip status
    pub grace_period_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            timeout_secs: 3,
            grace_period_secs: 10,
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// Container dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Timeout for create/list/delete container calls (covers image pulls)
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Interval between reconciliation passes
    pub interval_secs: u64,
    /// Exited containers older than this are deleted from their node
    pub retention_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            retention_secs: 3600,
        }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Strategy active at startup
    pub strategy: SchedulingStrategy,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the JSON collections; in-memory when unset
    pub data_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or EnvFilter directive
    pub level: String,
    /// Log format (json or text)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Node agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Address to bind the agent API
    pub address: String,
    /// Port for the agent API
    pub port: u16,
    /// Docker CLI binary
    pub docker_binary: PathBuf,
    /// Grace period given to `docker stop` before the container is killed
    pub stop_timeout_secs: u64,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8001,
            docker_binary: PathBuf::from("docker"),
            stop_timeout_secs: 5,
            logging: LoggingConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load agent configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::FleetError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::FleetError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::FleetError::Config(format!("Failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_daemon_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.health.interval(), Duration::from_secs(5));
        assert_eq!(config.health.grace_period(), Duration::from_secs(10));
        assert_eq!(config.reconcile.retention(), Duration::from_secs(3600));
        assert_eq!(config.scheduler.strategy, SchedulingStrategy::FirstFit);
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    fn test_partial_config_parse() {
        let toml_str = r#"
shutdown_timeout_secs = 3

[api]
port = 9000

[scheduler]
strategy = "round_robin"

[storage]
data_dir = "/var/lib/fleet"

[logging]
format = "json"
"#;
        let config = DaemonConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.address, "0.0.0.0");
        assert_eq!(config.scheduler.strategy, SchedulingStrategy::RoundRobin);
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/var/lib/fleet")));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(3));
        assert_eq!(config.health.timeout_secs, 3);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result = DaemonConfig::from_toml("[scheduler]\nstrategy = \"bogus\"\n");
        assert!(matches!(result, Err(crate::FleetError::Config(_))));
    }

    #[test]
    fn test_default_agent_config() {
        let config = AgentConfig::default();
        assert_eq!(config.port, 8001);
        assert_eq!(config.docker_binary, PathBuf::from("docker"));
    }
}
