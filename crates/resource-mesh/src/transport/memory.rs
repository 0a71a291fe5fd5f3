//! In-process network.
//!
//! [`MemoryNetwork`] is the peer registry: every attached node gets a slot
//! holding its inbound sender and topic subscriptions. The registry is an
//! ordinary value passed to whoever attaches nodes; there is no process-wide
//! state, so independent networks can coexist in one test binary.

use super::{topic_matches, Inbound, Medium, Transport};
use crate::error::{MeshError, Result};
use crate::message::{CrudMessage, Envelope, Event};
use crate::model::{NodeId, NodeInfo};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info};

struct PeerSlot {
    inbox: mpsc::Sender<Inbound>,
    topics: HashSet<String>,
}

/// Registry of the nodes attached to one in-process network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    peers: Arc<RwLock<HashMap<NodeId, PeerSlot>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new node under a fresh [`NodeId`] and returns its transport.
    pub async fn attach(&self, capacity: usize) -> Transport {
        let node_id = NodeId::new();
        let (inbox, inbound) = mpsc::channel(capacity.max(1));
        self.peers.write().await.insert(
            node_id.clone(),
            PeerSlot {
                inbox: inbox.clone(),
                topics: HashSet::new(),
            },
        );
        info!(node = %node_id, "Attached to memory network");

        Transport {
            medium: Arc::new(MemoryMedium {
                node_id,
                network: self.clone(),
            }),
            inbound,
            loopback: inbox,
        }
    }

    /// Removes a node, as if its process died. Its peers keep their directory
    /// entries but calls to it fail as unavailable.
    pub async fn detach(&self, node_id: &NodeId) -> bool {
        self.peers.write().await.remove(node_id).is_some()
    }

    pub async fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.peers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn inbox_of(&self, node_id: &NodeId) -> Option<mpsc::Sender<Inbound>> {
        self.peers.read().await.get(node_id).map(|slot| slot.inbox.clone())
    }

    async fn inboxes_except(&self, node_id: &NodeId) -> Vec<(NodeId, mpsc::Sender<Inbound>)> {
        self.peers
            .read()
            .await
            .iter()
            .filter(|(id, _)| *id != node_id)
            .map(|(id, slot)| (id.clone(), slot.inbox.clone()))
            .collect()
    }
}

/// A node's handle on a [`MemoryNetwork`].
pub struct MemoryMedium {
    node_id: NodeId,
    network: MemoryNetwork,
}

impl MemoryMedium {
    fn unavailable(peer: &NodeId, reason: &str) -> MeshError {
        MeshError::Unavailable {
            node: peer.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Medium for MemoryMedium {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn register(&self, info: NodeInfo) -> Result<()> {
        for (peer, inbox) in self.network.inboxes_except(&self.node_id).await {
            if inbox.send(Inbound::Registration(info.clone())).await.is_err() {
                debug!(node = %self.node_id, %peer, "Peer gone during registration");
            }
        }
        Ok(())
    }

    async fn send(&self, peer: &NodeInfo, message: CrudMessage) -> Result<Envelope> {
        let inbox = self
            .network
            .inbox_of(&peer.node_id)
            .await
            .ok_or_else(|| Self::unavailable(&peer.node_id, "not attached"))?;

        let (respond_to, response) = oneshot::channel();
        inbox
            .send(Inbound::Message {
                message,
                respond_to,
            })
            .await
            .map_err(|_| Self::unavailable(&peer.node_id, "inbox closed"))?;
        response
            .await
            .map_err(|_| Self::unavailable(&peer.node_id, "request dropped"))
    }

    async fn publish(&self, topic: &str, event: &Event) -> Result<()> {
        let targets: Vec<mpsc::Sender<Inbound>> = self
            .network
            .peers
            .read()
            .await
            .iter()
            .filter(|(id, slot)| {
                **id != self.node_id && slot.topics.iter().any(|sub| topic_matches(sub, topic))
            })
            .map(|(_, slot)| slot.inbox.clone())
            .collect();

        // Sequential sends keep each subscriber's view in publication order.
        for inbox in targets {
            let _ = inbox
                .send(Inbound::Event {
                    topic: topic.to_string(),
                    event: event.clone(),
                })
                .await;
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        let mut peers = self.network.peers.write().await;
        let slot = peers
            .get_mut(&self.node_id)
            .ok_or_else(|| Self::unavailable(&self.node_id, "not attached"))?;
        if slot.topics.insert(topic.to_string()) {
            debug!(node = %self.node_id, topic, "Subscribed");
        }
        Ok(())
    }

    async fn send_registration_answer(&self, peer: &NodeInfo, own: NodeInfo) -> Result<()> {
        let inbox = self
            .network
            .inbox_of(&peer.node_id)
            .await
            .ok_or_else(|| Self::unavailable(&peer.node_id, "not attached"))?;
        inbox
            .send(Inbound::Registration(own))
            .await
            .map_err(|_| Self::unavailable(&peer.node_id, "inbox closed"))
    }

    async fn connect_to_node(&self, peer: &NodeInfo) -> Result<()> {
        // Peers share the registry, so there is no connection to open.
        debug!(node = %self.node_id, peer = %peer.node_id, "Connected");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.network.detach(&self.node_id).await;
        info!(node = %self.node_id, "Detached from memory network");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;

    fn event() -> Event {
        Event {
            resource_name: "tasks".into(),
            resource_id: "t1".into(),
            action: "delete".into(),
            payload: Default::default(),
        }
    }

    fn info_of(transport: &Transport) -> NodeInfo {
        NodeInfo {
            node_id: transport.medium.node_id().clone(),
            name: "peer".into(),
            resources: vec![],
            node_type: NodeKind::Node,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_only_subscribed_peers() {
        let network = MemoryNetwork::new();
        let publisher = network.attach(8).await;
        let mut subscriber = network.attach(8).await;
        let mut bystander = network.attach(8).await;

        subscriber.medium.subscribe("tasks").await.unwrap();
        subscriber.medium.subscribe("tasks").await.unwrap();
        publisher.medium.publish("tasks.delete.t1", &event()).await.unwrap();

        match subscriber.inbound.recv().await {
            Some(Inbound::Event { topic, .. }) => assert_eq!(topic, "tasks.delete.t1"),
            other => panic!("unexpected inbound {other:?}"),
        }
        // One delivery despite the repeated subscription.
        assert!(subscriber.inbound.try_recv().is_err());
        assert!(bystander.inbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_detached_peer_is_unavailable() {
        let network = MemoryNetwork::new();
        let caller = network.attach(8).await;
        let callee = network.attach(8).await;
        let peer = info_of(&callee);

        callee.medium.close().await.unwrap();
        let err = caller
            .medium
            .send(&peer, CrudMessage::new("tasks", "list"))
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(network.node_ids().await, vec![caller.medium.node_id().clone()]);
    }

    #[tokio::test]
    async fn test_register_reaches_every_other_peer() {
        let network = MemoryNetwork::new();
        let announcer = network.attach(8).await;
        let mut a = network.attach(8).await;
        let mut b = network.attach(8).await;

        announcer.medium.register(info_of(&announcer)).await.unwrap();
        assert!(matches!(a.inbound.recv().await, Some(Inbound::Registration(_))));
        assert!(matches!(b.inbound.recv().await, Some(Inbound::Registration(_))));
    }
}
