//! # Cluster Lifecycle
//!
//! [`ClusterSystem`] wires a two-node cluster on an in-process network:
//!
//! - a **host** owning the `tasks` collection,
//! - a **notifier** worker with a rule on completed tasks.
//!
//! The notifier never hosts data. It learns about completions from the host's
//! events, and its reconciliation sweep catches completions it missed.

use crate::clients::TaskClient;
use crate::model::{TaskState, TASKS};
use resource_mesh::{
    MemoryNetwork, MemoryStorage, NodeActor, NodeClient, NodeConfig, RuleHit, PERIODIC,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

/// Completed task ids seen by the notifier.
#[derive(Clone, Debug, Default)]
pub struct CompletionLog {
    seen: Arc<Mutex<BTreeSet<String>>>,
}

impl CompletionLog {
    fn record(&self, hit: RuleHit) {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if seen.insert(hit.resource_id.clone()) {
            info!(task = %hit.resource_id, via = %hit.action, "Task completed");
        } else if hit.action != PERIODIC {
            info!(task = %hit.resource_id, "Task completed again");
        }
    }

    /// Sorted ids of every completed task seen so far.
    pub fn completed(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

pub struct ClusterSystem {
    /// Tasks API routed through the notifier, so every call crosses the network.
    pub task_client: TaskClient,
    /// Tasks API on the host itself.
    pub host_task_client: TaskClient,
    pub host: NodeClient,
    pub notifier: NodeClient,
    pub completions: CompletionLog,
    pub network: MemoryNetwork,
    handles: Vec<JoinHandle<()>>,
}

impl ClusterSystem {
    /// Starts the host and the notifier and waits until each knows the other.
    pub async fn new(config: NodeConfig) -> Result<Self, String> {
        let network = MemoryNetwork::new();

        let (mut host_node, host) =
            NodeActor::host("task-host", config.clone(), network.attach(config.inbox_capacity).await);
        host_node
            .register_collection(TASKS, MemoryStorage::new())
            .map_err(|e| e.to_string())?;

        let completions = CompletionLog::default();
        let (mut notifier_node, notifier) =
            NodeActor::worker("notifier", config.clone(), network.attach(config.inbox_capacity).await);
        let log = completions.clone();
        let mut done = serde_json::Map::new();
        done.insert("state".into(), Value::String(TaskState::Done.as_str().into()));
        notifier_node.register_rule(TASKS, done, move |hit: RuleHit| log.record(hit));

        let mut host_joins = host_node.peer_joins();
        let mut notifier_joins = notifier_node.peer_joins();
        let handles = vec![
            tokio::spawn(host_node.run()),
            tokio::spawn(notifier_node.run()),
        ];
        host_joins.recv().await.map_err(|e| e.to_string())?;
        notifier_joins.recv().await.map_err(|e| e.to_string())?;
        info!("Cluster ready");

        Ok(Self {
            task_client: TaskClient::new(notifier.clone()),
            host_task_client: TaskClient::new(host.clone()),
            host,
            notifier,
            completions,
            network,
            handles,
        })
    }

    /// Stops both nodes and waits for their loops to finish.
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down cluster...");
        self.notifier.shutdown().await.map_err(|e| e.to_string())?;
        self.host.shutdown().await.map_err(|e| e.to_string())?;

        for handle in self.handles {
            handle.await.map_err(|e| format!("node task failed: {e}"))?;
        }
        info!("Cluster shut down");
        Ok(())
    }
}
