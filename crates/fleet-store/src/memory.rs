//! In-memory collection

use async_trait::async_trait;
use fleet_core::{FleetError, FleetResult};
use tokio::sync::RwLock;

use crate::collection::{Collection, Document};

/// Collection held entirely in memory, lost on restart
pub struct MemoryCollection<T> {
    docs: RwLock<Vec<T>>,
}

impl<T> MemoryCollection<T> {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Default for MemoryCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Document> Collection<T> for MemoryCollection<T> {
    async fn insert(&self, doc: T) -> FleetResult<()> {
        let mut docs = self.docs.write().await;
        if docs.iter().any(|d| d.id() == doc.id()) {
            return Err(FleetError::AlreadyExists(doc.id().to_string()));
        }
        docs.push(doc);
        Ok(())
    }

    async fn find(&self, id: &str) -> FleetResult<Option<T>> {
        let docs = self.docs.read().await;
        Ok(docs.iter().find(|d| d.id() == id).cloned())
    }

    async fn find_all(&self) -> FleetResult<Vec<T>> {
        Ok(self.docs.read().await.clone())
    }

    async fn update(&self, doc: T) -> FleetResult<bool> {
        let mut docs = self.docs.write().await;
        match docs.iter_mut().find(|d| d.id() == doc.id()) {
            Some(slot) => {
                *slot = doc;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> FleetResult<bool> {
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|d| d.id() != id);
        Ok(docs.len() != before)
    }
}
