//! fleet-runtime: Container runtime abstraction layer
//!
//! This crate provides the container engine used by the node agent:
//! - `ContainerRuntime` trait
//! - Docker CLI runtime

pub mod docker;
pub mod traits;

pub use docker::{DockerCliConfig, DockerCliRuntime};
pub use traits::ContainerRuntime;
