//! # Node Client
//!
//! The handle applications, workers and the node's own background tasks use
//! to talk to a [`NodeActor`](crate::node::NodeActor).

use crate::error::{MeshError, Result};
use crate::message::CrudMessage;
use crate::model::{Matcher, NodeId, NodeInfo};
use crate::node::NodeRequest;
use crate::rules::{Rule, RuleCallback};
use crate::worker::CycleReport;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::{broadcast, mpsc, oneshot};

/// A cheap-to-clone client of one node.
#[derive(Clone, Debug)]
pub struct NodeClient {
    sender: mpsc::Sender<NodeRequest>,
}

impl NodeClient {
    pub fn new(sender: mpsc::Sender<NodeRequest>) -> Self {
        Self { sender }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> NodeRequest) -> Result<T> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| MeshError::NodeClosed)?;
        response.await.map_err(|_| MeshError::NodeDropped)
    }

    /// Routes a CRUD message to whichever node hosts its collection and
    /// returns the payload of the answering envelope.
    ///
    /// # Errors
    ///
    /// * [`MeshError::UnknownService`] if no node is known to host the collection.
    /// * [`MeshError::Application`] if the owner answered with a failed envelope.
    /// * [`MeshError::Unavailable`] / [`MeshError::Timeout`] if the owner could not be reached.
    pub async fn send(&self, message: CrudMessage) -> Result<Value> {
        self.request(|respond_to| NodeRequest::Send {
            message,
            respond_to,
        })
        .await?
    }

    /// Sends a message to one specific peer, bypassing the resource directory.
    pub async fn send_to_node(&self, node_id: &NodeId, message: CrudMessage) -> Result<Value> {
        let node_id = node_id.clone();
        self.request(|respond_to| NodeRequest::SendToNode {
            node_id,
            message,
            respond_to,
        })
        .await?
    }

    /// Adds a rule for `resource_type` and subscribes the node to its events.
    pub async fn register(
        &self,
        resource_type: &str,
        matcher: Matcher,
        callback: impl RuleCallback,
    ) -> Result<()> {
        let resource_type = resource_type.to_string();
        let rule = Rule::new(matcher, callback);
        self.request(|respond_to| NodeRequest::Register {
            resource_type,
            rule,
            respond_to,
        })
        .await?
    }

    /// What the node announces to its peers.
    pub async fn info(&self) -> Result<NodeInfo> {
        self.request(|respond_to| NodeRequest::Info { respond_to }).await
    }

    /// Collection name to owning peer, as currently known.
    pub async fn resource_directory(&self) -> Result<BTreeMap<String, NodeId>> {
        self.request(|respond_to| NodeRequest::Directory { respond_to })
            .await
    }

    pub async fn known_workers(&self) -> Result<BTreeMap<String, Vec<String>>> {
        self.request(|respond_to| NodeRequest::KnownWorkers { respond_to })
            .await
    }

    /// A stream of peers as they join; each distinct peer appears once.
    pub async fn peer_joins(&self) -> Result<broadcast::Receiver<NodeInfo>> {
        self.request(|respond_to| NodeRequest::PeerJoins { respond_to })
            .await
    }

    /// Runs one reconciliation cycle now and waits for its report.
    pub async fn poll_check(&self) -> Result<CycleReport> {
        self.request(|respond_to| NodeRequest::PollCheck { respond_to })
            .await
    }

    /// Stops the node, leaving the network and stopping its collections.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|respond_to| NodeRequest::Shutdown { respond_to })
            .await
    }
}
