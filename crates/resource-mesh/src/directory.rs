//! # Directories
//!
//! Routing state kept by each node: who is out there ([`NodesDirectory`]), who
//! owns which collection ([`ResourceDirectory`]) and which workers react to
//! which resource type ([`WorkerDirectory`]). All three are owned by the node
//! loop and only mutated from it.

use crate::config::ConflictPolicy;
use crate::model::{NodeId, NodeInfo};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Every peer this node has seen register, keyed by id.
#[derive(Debug, Default)]
pub struct NodesDirectory {
    nodes: HashMap<NodeId, NodeInfo>,
}

impl NodesDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves a peer. Returns false if the id was already known, in which case
    /// the stored info is left untouched.
    pub fn insert(&mut self, info: NodeInfo) -> bool {
        if self.nodes.contains_key(&info.node_id) {
            return false;
        }
        self.nodes.insert(info.node_id.clone(), info);
        true
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&NodeInfo> {
        self.nodes.get(node_id)
    }

    pub fn peer_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Result of offering an owner for a collection name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The name had no owner.
    Added,
    /// The same node announced the name again.
    Unchanged,
    /// Another node owned the name and was replaced.
    Replaced { previous: NodeId },
    /// Another node owns the name and keeps it.
    Kept { owner: NodeId },
}

/// Collection name to owning node. Never holds more than one owner per name.
#[derive(Debug, Default)]
pub struct ResourceDirectory {
    owners: HashMap<String, NodeId>,
}

impl ResourceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, name: &str, node_id: &NodeId, policy: ConflictPolicy) -> MergeOutcome {
        let outcome = match self.owners.get(name) {
            None => MergeOutcome::Added,
            Some(owner) if owner == node_id => MergeOutcome::Unchanged,
            Some(owner) => match policy {
                ConflictPolicy::LastWriteWins => MergeOutcome::Replaced {
                    previous: owner.clone(),
                },
                ConflictPolicy::KeepFirst => MergeOutcome::Kept {
                    owner: owner.clone(),
                },
            },
        };

        match &outcome {
            MergeOutcome::Added => {
                debug!(collection = name, node = %node_id, "Owner recorded");
                self.owners.insert(name.to_string(), node_id.clone());
            }
            MergeOutcome::Replaced { previous } => {
                warn!(collection = name, %previous, node = %node_id, "Ownership conflict, replacing owner");
                self.owners.insert(name.to_string(), node_id.clone());
            }
            MergeOutcome::Kept { owner } => {
                warn!(collection = name, %owner, node = %node_id, "Ownership conflict, keeping owner");
            }
            MergeOutcome::Unchanged => {}
        }
        outcome
    }

    pub fn owner(&self, name: &str) -> Option<&NodeId> {
        self.owners.get(name)
    }

    /// A sorted copy of the directory.
    pub fn snapshot(&self) -> BTreeMap<String, NodeId> {
        self.owners
            .iter()
            .map(|(name, id)| (name.clone(), id.clone()))
            .collect()
    }
}

/// Resource type to the workers known to react to it, keyed by worker name.
#[derive(Debug, Default)]
pub struct WorkerDirectory {
    workers: HashMap<String, HashMap<String, NodeInfo>>,
}

impl WorkerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource_type: &str, worker: NodeInfo) {
        debug!(resource_type, worker = %worker.name, "Worker recorded");
        self.workers
            .entry(resource_type.to_string())
            .or_default()
            .insert(worker.name.clone(), worker);
    }

    /// Resource type to sorted worker names.
    pub fn known_workers(&self) -> BTreeMap<String, Vec<String>> {
        self.workers
            .iter()
            .map(|(resource_type, workers)| {
                let mut names: Vec<String> = workers.keys().cloned().collect();
                names.sort();
                (resource_type.clone(), names)
            })
            .collect()
    }
}
