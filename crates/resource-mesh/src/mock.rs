//! # Mock Medium & Testing Guide
//!
//! [`MockMedium`] implements [`Medium`] without any network behind it. Remote
//! calls are answered from a queue of scripted expectations, and every other
//! call is recorded so a test can assert on what the node did.
//!
//! ## When to use the mock vs a memory network
//!
//! | Feature | MockMedium | MemoryNetwork |
//! |---------|------------|---------------|
//! | **Peers** | Scripted replies | Real nodes |
//! | **Determinism** | Fully deterministic | Subject to scheduler |
//! | **Error injection** | Easy (`return_err`, `hang`) | Detach a node |
//! | **Use case** | Routing, timeouts, handshake | End-to-end flows |
//!
//! ## Example
//!
//! ```rust
//! use resource_mesh::mock::MockMedium;
//! use resource_mesh::{MeshError, NodeActor, NodeConfig, NodeId, NodeInfo, NodeKind};
//! use resource_mesh::{CrudMessage, Envelope, Inbound};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockMedium::new();
//!     let (transport, inject) = mock.transport(16);
//!     let (node, client) = NodeActor::host("router", NodeConfig::default(), transport);
//!     tokio::spawn(node.run());
//!
//!     // A peer announces that it owns `tasks`.
//!     let peer = NodeInfo {
//!         node_id: NodeId::from("peer-1"),
//!         name: "peer".into(),
//!         resources: vec!["tasks".into()],
//!         node_type: NodeKind::Node,
//!     };
//!     let mut joins = client.peer_joins().await.unwrap();
//!     inject.send(Inbound::Registration(peer)).await.unwrap();
//!     joins.recv().await.unwrap();
//!
//!     // The owner fails the call; the router reports only its message.
//!     mock.expect_send().return_ok(Envelope::failure("boom"));
//!     let err = client.send(CrudMessage::new("tasks", "list")).await.unwrap_err();
//!     assert_eq!(err, MeshError::Application("boom".into()));
//!     mock.verify();
//! }
//! ```

use crate::error::{MeshError, Result};
use crate::message::{CrudMessage, Envelope, Event};
use crate::model::{NodeId, NodeInfo};
use crate::transport::{Inbound, Medium, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

/// How the mock answers the next remote `send`.
enum Expectation {
    Reply(Result<Envelope>),
    Hang,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A scripted [`Medium`] with recording.
#[derive(Default)]
pub struct MockMedium {
    node_id: NodeId,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    unexpected: Mutex<Vec<CrudMessage>>,
    sent: Mutex<Vec<(NodeId, CrudMessage)>>,
    published: Mutex<Vec<(String, Event)>>,
    subscriptions: Mutex<Vec<String>>,
    announcements: Mutex<Vec<NodeInfo>>,
    answers: Mutex<Vec<NodeId>>,
    connections: Mutex<Vec<NodeId>>,
    closed: Mutex<bool>,
}

impl MockMedium {
    /// A mock with a fresh node id and no expectations.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            node_id: NodeId::new(),
            ..Self::default()
        })
    }

    /// A transport backed by this mock, plus a sender for injecting inbound
    /// traffic as if it came from peers.
    pub fn transport(self: &Arc<Self>, capacity: usize) -> (Transport, mpsc::Sender<Inbound>) {
        let (loopback, inbound) = mpsc::channel(capacity.max(1));
        let transport = Transport {
            medium: self.clone(),
            inbound,
            loopback: loopback.clone(),
        };
        (transport, loopback)
    }

    /// Expects a remote `send`. Expectations are consumed in order.
    pub fn expect_send(&self) -> SendExpectationBuilder {
        SendExpectationBuilder {
            expectations: self.expectations.clone(),
        }
    }

    /// Panics if a scripted expectation was left unused or a send arrived unscripted.
    pub fn verify(&self) {
        let remaining = lock(&self.expectations).len();
        if remaining != 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
        let unexpected = lock(&self.unexpected);
        if !unexpected.is_empty() {
            panic!("Unexpected sends: {:?}", *unexpected);
        }
    }

    /// Remote sends in call order, with the peer they targeted.
    pub fn sent(&self) -> Vec<(NodeId, CrudMessage)> {
        lock(&self.sent).clone()
    }

    pub fn published(&self) -> Vec<(String, Event)> {
        lock(&self.published).clone()
    }

    /// Every subscribe call, repeats included.
    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.subscriptions).clone()
    }

    /// What the node announced about itself via `register`.
    pub fn announcements(&self) -> Vec<NodeInfo> {
        lock(&self.announcements).clone()
    }

    /// Peers that received a registration answer.
    pub fn answers(&self) -> Vec<NodeId> {
        lock(&self.answers).clone()
    }

    pub fn connections(&self) -> Vec<NodeId> {
        lock(&self.connections).clone()
    }

    pub fn is_closed(&self) -> bool {
        *lock(&self.closed)
    }
}

#[async_trait]
impl Medium for MockMedium {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn register(&self, info: NodeInfo) -> Result<()> {
        lock(&self.announcements).push(info);
        Ok(())
    }

    async fn send(&self, peer: &NodeInfo, message: CrudMessage) -> Result<Envelope> {
        lock(&self.sent).push((peer.node_id.clone(), message.clone()));
        let expectation = lock(&self.expectations).pop_front();
        match expectation {
            Some(Expectation::Reply(reply)) => reply,
            Some(Expectation::Hang) => std::future::pending().await,
            None => {
                lock(&self.unexpected).push(message);
                Err(MeshError::Unavailable {
                    node: peer.node_id.to_string(),
                    reason: "no scripted reply".into(),
                })
            }
        }
    }

    async fn publish(&self, topic: &str, event: &Event) -> Result<()> {
        lock(&self.published).push((topic.to_string(), event.clone()));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        lock(&self.subscriptions).push(topic.to_string());
        Ok(())
    }

    async fn send_registration_answer(&self, peer: &NodeInfo, _own: NodeInfo) -> Result<()> {
        lock(&self.answers).push(peer.node_id.clone());
        Ok(())
    }

    async fn connect_to_node(&self, peer: &NodeInfo) -> Result<()> {
        lock(&self.connections).push(peer.node_id.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *lock(&self.closed) = true;
        Ok(())
    }
}

/// Builder for `send` expectations.
pub struct SendExpectationBuilder {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl SendExpectationBuilder {
    /// The peer answers with `envelope` (which may itself be a failure).
    pub fn return_ok(self, envelope: Envelope) {
        lock(&self.expectations).push_back(Expectation::Reply(Ok(envelope)));
    }

    /// The medium fails the call, e.g. with [`MeshError::Unavailable`].
    pub fn return_err(self, error: MeshError) {
        lock(&self.expectations).push_back(Expectation::Reply(Err(error)));
    }

    /// The peer never answers; the caller's timeout decides.
    pub fn hang(self) {
        lock(&self.expectations).push_back(Expectation::Hang);
    }
}
