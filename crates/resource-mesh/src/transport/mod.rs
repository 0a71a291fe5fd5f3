//! # Transport
//!
//! The medium a node talks to its peers through. Connection handling, framing
//! and liveness belong to the medium; the node only sees the [`Medium`] calls
//! and the [`Inbound`] stream.
//!
//! - [`memory`] - an in-process network of nodes, used by the sample and tests.

pub mod memory;

use crate::error::Result;
use crate::message::{CrudMessage, Envelope, Event};
use crate::model::{NodeId, NodeInfo};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Traffic a medium hands to its node.
#[derive(Debug)]
pub enum Inbound {
    /// A CRUD request from a peer; the envelope goes back on `respond_to`.
    Message {
        message: CrudMessage,
        respond_to: oneshot::Sender<Envelope>,
    },
    /// A published event on a topic the node subscribed to, or its own
    /// event looped back.
    Event { topic: String, event: Event },
    /// A peer announcing itself, or answering our announcement.
    Registration(NodeInfo),
}

/// Peer-to-peer primitives consumed by the node.
#[async_trait]
pub trait Medium: Send + Sync + 'static {
    fn node_id(&self) -> &NodeId;

    /// Announces this node to every reachable peer.
    async fn register(&self, info: NodeInfo) -> Result<()>;

    /// Request/response call to one peer. Unbounded; the caller applies the timeout.
    async fn send(&self, peer: &NodeInfo, message: CrudMessage) -> Result<Envelope>;

    /// Broadcasts an event to every peer subscribed to a prefix of `topic`.
    async fn publish(&self, topic: &str, event: &Event) -> Result<()>;

    /// Subscribes this node to `topic`. Subscribing twice has no extra effect.
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Answers a registration with this node's own info.
    async fn send_registration_answer(&self, peer: &NodeInfo, own: NodeInfo) -> Result<()>;

    async fn connect_to_node(&self, peer: &NodeInfo) -> Result<()>;

    /// Leaves the network. Peers sending to this node afterwards see it as unavailable.
    async fn close(&self) -> Result<()>;
}

/// Everything a node needs from its medium: the medium itself, the inbound
/// stream, and a sender into that stream for local loopback.
pub struct Transport {
    pub medium: Arc<dyn Medium>,
    pub inbound: mpsc::Receiver<Inbound>,
    pub loopback: mpsc::Sender<Inbound>,
}

/// Segment-prefix subscription match: `tasks` matches `tasks` and
/// `tasks.create.t1`, but not `tasksets.create.t1`.
pub fn topic_matches(subscription: &str, topic: &str) -> bool {
    topic
        .strip_prefix(subscription)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}
