//! Document collection trait definitions

use async_trait::async_trait;
use fleet_core::{FleetResult, Job, NodeSpec};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A record stored in a collection, keyed by its `id`
pub trait Document: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
}

impl Document for Job {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for NodeSpec {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Collection-style document store
///
/// No transactional guarantees are offered; callers are expected to apply
/// updates idempotently.
#[async_trait]
pub trait Collection<T: Document>: Send + Sync {
    /// Insert a new document, failing with `AlreadyExists` if the id is taken
    async fn insert(&self, doc: T) -> FleetResult<()>;

    /// Find a document by id
    async fn find(&self, id: &str) -> FleetResult<Option<T>>;

    /// All documents in insertion order
    async fn find_all(&self) -> FleetResult<Vec<T>>;

    /// Replace the document with the same id; returns whether one matched
    async fn update(&self, doc: T) -> FleetResult<bool>;

    /// Delete a document by id; returns whether one existed
    async fn delete(&self, id: &str) -> FleetResult<bool>;

    /// Update the document if present, insert it otherwise
    async fn upsert(&self, doc: T) -> FleetResult<()> {
        if !self.update(doc.clone()).await? {
            self.insert(doc).await?;
        }
        Ok(())
    }
}
