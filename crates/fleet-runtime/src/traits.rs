//! Runtime trait definitions

use async_trait::async_trait;
use fleet_core::{ContainerInfo, ContainerRequest, FleetResult};

/// Container engine driven by the node agent
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a detached container
    async fn create(&self, request: &ContainerRequest) -> FleetResult<ContainerInfo>;

    /// List containers; stopped ones only when `all` is set
    async fn list(&self, all: bool) -> FleetResult<Vec<ContainerInfo>>;

    /// Stop and remove a container by name or id
    ///
    /// Fails with `ContainerNotFound` if no such container exists.
    async fn remove(&self, name_or_id: &str) -> FleetResult<()>;

    /// Check that the engine is reachable
    async fn ping(&self) -> bool;

    /// Get the runtime name
    fn name(&self) -> &'static str;
}
