//! JSON-file backed collection
//!
//! The whole collection lives in memory and is rewritten to disk after every
//! mutation (write to a temporary file, then rename). A mutation only becomes
//! visible once the file write has succeeded.

use async_trait::async_trait;
use fleet_core::{FleetError, FleetResult};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::collection::{Collection, Document};

/// Collection persisted as a JSON array in a single file
pub struct JsonFileCollection<T> {
    path: PathBuf,
    docs: Mutex<Vec<T>>,
}

impl<T: Document> JsonFileCollection<T> {
    /// Open the collection at `path`, loading existing documents if the file exists
    pub async fn open(path: impl Into<PathBuf>) -> FleetResult<Self> {
        let path = path.into();

        let docs = if tokio::fs::try_exists(&path).await.map_err(store_error)? {
            let content = tokio::fs::read(&path).await.map_err(store_error)?;
            let docs: Vec<T> = serde_json::from_slice(&content)?;
            info!(path = %path.display(), documents = docs.len(), "Loaded collection");
            docs
        } else {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(store_error)?;
            }
            Vec::new()
        };

        Ok(Self {
            path,
            docs: Mutex::new(docs),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, docs: &[T]) -> FleetResult<()> {
        let content = serde_json::to_vec_pretty(docs)?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, content).await.map_err(store_error)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(store_error)?;

        debug!(path = %self.path.display(), documents = docs.len(), "Collection flushed");
        Ok(())
    }
}

fn store_error(err: std::io::Error) -> FleetError {
    FleetError::StoreUnavailable(err.to_string())
}

#[async_trait]
impl<T: Document> Collection<T> for JsonFileCollection<T> {
    async fn insert(&self, doc: T) -> FleetResult<()> {
        let mut docs = self.docs.lock().await;
        if docs.iter().any(|d| d.id() == doc.id()) {
            return Err(FleetError::AlreadyExists(doc.id().to_string()));
        }

        let mut next = docs.clone();
        next.push(doc);
        self.persist(&next).await?;
        *docs = next;
        Ok(())
    }

    async fn find(&self, id: &str) -> FleetResult<Option<T>> {
        let docs = self.docs.lock().await;
        Ok(docs.iter().find(|d| d.id() == id).cloned())
    }

    async fn find_all(&self) -> FleetResult<Vec<T>> {
        Ok(self.docs.lock().await.clone())
    }

    async fn update(&self, doc: T) -> FleetResult<bool> {
        let mut docs = self.docs.lock().await;
        let Some(index) = docs.iter().position(|d| d.id() == doc.id()) else {
            return Ok(false);
        };

        let mut next = docs.clone();
        next[index] = doc;
        self.persist(&next).await?;
        *docs = next;
        Ok(true)
    }

    async fn delete(&self, id: &str) -> FleetResult<bool> {
        let mut docs = self.docs.lock().await;
        if !docs.iter().any(|d| d.id() == id) {
            return Ok(false);
        }

        let next: Vec<T> = docs.iter().filter(|d| d.id() != id).cloned().collect();
        self.persist(&next).await?;
        *docs = next;
        Ok(true)
    }
}
