//! fleet-store: Job and node persistence
//!
//! This crate provides the document-store contract consumed by the control plane:
//! - `Collection` trait with insert / find / update / delete by id
//! - In-memory collections
//! - JSON-file backed collections

pub mod collection;
pub mod file;
pub mod memory;

pub use collection::{Collection, Document};
pub use file::JsonFileCollection;
pub use memory::MemoryCollection;
