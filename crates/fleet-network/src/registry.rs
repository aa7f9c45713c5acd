//! Node registry
//!
//! Owns the set of known nodes and is the only place node health fields are
//! mutated. Reads come in two flavours: cached (`get`, `list`, `healthy`),
//! which never touch the network, and refreshing (`get_refreshed`,
//! `list_refreshed`), which probe first.

use chrono::Utc;
use fleet_core::{FleetResult, Node, NodeSpec, NodeStatus};
use fleet_store::Collection;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::agent::NodeAgent;
use crate::health::{HealthPolicy, ProbeOutcome};

struct NodeEntry {
    node: Node,
    /// Registration order, kept across re-registration
    seq: u64,
    /// Bumped on every registration so stale probe results can be dropped
    generation: u64,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, NodeEntry>,
    counter: u64,
}

impl RegistryInner {
    fn upsert(&mut self, node: Node) -> u64 {
        self.counter += 1;
        let generation = self.counter;
        let seq = self
            .entries
            .get(&node.id)
            .map(|entry| entry.seq)
            .unwrap_or(generation);

        self.entries.insert(
            node.id.clone(),
            NodeEntry {
                node,
                seq,
                generation,
            },
        );
        generation
    }

    fn ordered(&self) -> Vec<Node> {
        let mut entries: Vec<&NodeEntry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.node.clone()).collect()
    }
}

/// Registry of worker nodes and their health
pub struct NodeRegistry {
    agent: Arc<dyn NodeAgent>,
    policy: HealthPolicy,
    store: Option<Arc<dyn Collection<NodeSpec>>>,
    inner: RwLock<RegistryInner>,
}

impl NodeRegistry {
    /// Create an in-memory registry
    pub fn new(agent: Arc<dyn NodeAgent>, policy: HealthPolicy) -> Self {
        Self {
            agent,
            policy,
            store: None,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Persist node specs to `store` on registration and removal
    pub fn with_store(mut self, store: Arc<dyn Collection<NodeSpec>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Reload persisted node specs. Restored nodes start as `unknown`.
    pub async fn restore(&self) -> FleetResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let specs = store.find_all().await?;
        let count = specs.len();
        {
            let mut inner = self.inner.write().await;
            for spec in specs {
                inner.upsert(Node::from_spec(spec));
            }
        }

        if count > 0 {
            info!(nodes = count, "Restored registered nodes");
        }
        Ok(count)
    }

    /// Register or overwrite a node, then probe it once
    pub async fn register(&self, spec: NodeSpec) -> FleetResult<Node> {
        if let Some(store) = &self.store {
            store.upsert(spec.clone()).await?;
        }

        let id = spec.id.clone();
        let node = Node::from_spec(spec);
        info!(
            node_id = %id,
            endpoint = %node.endpoint(),
            cpu = node.cpu,
            memory_mb = node.memory,
            "Registering node"
        );
        self.inner.write().await.upsert(node.clone());

        // A concurrent remove() can win the race; report what was registered.
        Ok(self.refresh(&id).await.unwrap_or(node))
    }

    /// Cached view of one node
    pub async fn get(&self, id: &str) -> Option<Node> {
        self.inner
            .read()
            .await
            .entries
            .get(id)
            .map(|entry| entry.node.clone())
    }

    /// Probe one node, then return it
    pub async fn get_refreshed(&self, id: &str) -> Option<Node> {
        self.refresh(id).await
    }

    /// Cached view of every node in registration order
    pub async fn list(&self) -> Vec<Node> {
        self.inner.read().await.ordered()
    }

    /// Probe every node concurrently, then return them in registration order
    pub async fn list_refreshed(&self) -> Vec<Node> {
        self.refresh_all().await;
        self.list().await
    }

    /// Cached view of online nodes, used on the scheduling path
    pub async fn healthy(&self) -> Vec<Node> {
        self.list()
            .await
            .into_iter()
            .filter(Node::is_online)
            .collect()
    }

    /// Remove a node; returns whether it was registered
    pub async fn remove(&self, id: &str) -> FleetResult<bool> {
        let persisted = match &self.store {
            Some(store) => store.delete(id).await?,
            None => false,
        };

        let existed = self.inner.write().await.entries.remove(id).is_some();
        if existed {
            info!(node_id = %id, "Node removed");
        }
        Ok(existed || persisted)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Probe one node and apply the outcome. `None` if the node is unknown.
    pub async fn refresh(&self, id: &str) -> Option<Node> {
        let (endpoint, generation) = {
            let inner = self.inner.read().await;
            let entry = inner.entries.get(id)?;
            (entry.node.endpoint(), entry.generation)
        };

        // No lock is held while the probe is in flight.
        let outcome = self.agent.health(&endpoint).await;
        let now = Utc::now();

        let mut inner = self.inner.write().await;
        let entry = inner.entries.get_mut(id)?;
        if entry.generation != generation {
            debug!(node_id = %id, "Node re-registered during probe, discarding result");
            return Some(entry.node.clone());
        }

        let previous = entry.node.status;
        self.policy.apply(&mut entry.node, &outcome, now);
        log_transition(&entry.node, previous, &outcome);

        Some(entry.node.clone())
    }

    /// Probe every registered node concurrently
    pub async fn refresh_all(&self) {
        let ids: Vec<String> = self.inner.read().await.entries.keys().cloned().collect();
        if ids.is_empty() {
            return;
        }

        join_all(ids.iter().map(|id| self.refresh(id))).await;
        debug!(nodes = ids.len(), "Health refresh pass complete");
    }
}

fn log_transition(node: &Node, previous: NodeStatus, outcome: &ProbeOutcome) {
    match (previous, node.status) {
        (NodeStatus::Online, NodeStatus::Offline) | (NodeStatus::Unknown, NodeStatus::Offline) => {
            warn!(
                node_id = %node.id,
                failures = node.heartbeat_failures,
                error = node.last_error.as_deref().unwrap_or(""),
                "Node went offline"
            );
        }
        (from, NodeStatus::Online) if from != NodeStatus::Online => {
            info!(node_id = %node.id, from = %from, "Node is online");
        }
        _ => {
            if let ProbeOutcome::Failed { error, .. } = outcome {
                debug!(
                    node_id = %node.id,
                    status = %node.status,
                    failures = node.heartbeat_failures,
                    error = %error,
                    "Heartbeat failed"
                );
            }
        }
    }
}
