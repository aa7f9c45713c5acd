//! Error types for fleet

use thiserror::Error;

/// Main error type for fleet
#[derive(Error, Debug)]
pub enum FleetError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A node agent could not be reached (connect error, timeout, DNS)
    #[error("Node unreachable: {0}")]
    NodeUnreachable(String),

    /// A node agent rejected a container create/delete request
    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    /// Strategy name is not one of the recognized strategies
    #[error("Invalid scheduling strategy: {0}")]
    InvalidStrategy(String),

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Container not found on a node
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// A document with the same id already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The persistent store failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Container runtime error (node agent side)
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for fleet operations
pub type FleetResult<T> = Result<T, FleetError>;

impl FleetError {
    /// Whether this error means the addressed record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FleetError::NodeNotFound(_)
                | FleetError::JobNotFound(_)
                | FleetError::ContainerNotFound(_)
        )
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        FleetError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for FleetError {
    fn from(err: toml::de::Error) -> Self {
        FleetError::Config(err.to_string())
    }
}
