//! # Node Actor
//!
//! The control loop of one cluster member. A [`NodeActor`] owns the routing
//! state (nodes, resource and worker directories), the rule book and the
//! clients of its locally hosted collections, and services three inputs on a
//! single task:
//!
//! - requests from its [`NodeClient`]s,
//! - inbound traffic from the transport (peer messages, events, registrations),
//! - the reconciliation timer.
//!
//! Local dispatch, remote calls, rule callbacks and reconciliation cycles are
//! spawned, so an outstanding `send` only suspends the task that issued it
//! while the loop keeps serving. Registration traffic (the start-up
//! announcement, answers and connects) is awaited inline and is bounded by
//! the medium's delivery to peer inboxes.

use crate::client::NodeClient;
use crate::collection::{CollectionActor, CollectionClient};
use crate::config::NodeConfig;
use crate::directory::{NodesDirectory, ResourceDirectory, WorkerDirectory};
use crate::error::{MeshError, Result};
use crate::message::{CrudMessage, Envelope, Event, Response};
use crate::model::{worker_name, Matcher, NodeId, NodeInfo, NodeKind};
use crate::publisher::EventPublisher;
use crate::rules::{Rule, RuleBook, RuleCallback};
use crate::storage::Storage;
use crate::transport::{Inbound, Medium, Transport};
use crate::worker::{self, CycleReport, LaneItem};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Requests a [`NodeClient`] sends to its node.
#[derive(Debug)]
pub enum NodeRequest {
    Send {
        message: CrudMessage,
        respond_to: Response<Value>,
    },
    SendToNode {
        node_id: NodeId,
        message: CrudMessage,
        respond_to: Response<Value>,
    },
    Register {
        resource_type: String,
        rule: Rule,
        respond_to: Response<()>,
    },
    Info {
        respond_to: oneshot::Sender<NodeInfo>,
    },
    Directory {
        respond_to: oneshot::Sender<BTreeMap<String, NodeId>>,
    },
    KnownWorkers {
        respond_to: oneshot::Sender<BTreeMap<String, Vec<String>>>,
    },
    PeerJoins {
        respond_to: oneshot::Sender<broadcast::Receiver<NodeInfo>>,
    },
    PollCheck {
        respond_to: oneshot::Sender<CycleReport>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// One member of the cluster: a collection host or a worker.
///
/// # Usage
///
/// ```rust
/// use resource_mesh::{MemoryNetwork, MemoryStorage, NodeActor, NodeConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let network = MemoryNetwork::new();
///     let config = NodeConfig::default();
///
///     let (mut node, client) =
///         NodeActor::host("tasks-host", config.clone(), network.attach(config.inbox_capacity).await);
///     node.register_collection("tasks", MemoryStorage::new()).unwrap();
///     tokio::spawn(node.run());
///
///     let info = client.info().await.unwrap();
///     assert_eq!(info.resources, vec!["tasks".to_string()]);
///     client.shutdown().await.unwrap();
/// }
/// ```
pub struct NodeActor {
    name: String,
    kind: NodeKind,
    config: NodeConfig,
    medium: Arc<dyn Medium>,
    inbound: mpsc::Receiver<Inbound>,
    loopback: mpsc::Sender<Inbound>,
    requests: mpsc::Receiver<NodeRequest>,
    handle: mpsc::WeakSender<NodeRequest>,
    collections: HashMap<String, CollectionClient>,
    pending: Vec<CollectionActor>,
    nodes: NodesDirectory,
    resources: ResourceDirectory,
    workers: WorkerDirectory,
    rules: RuleBook,
    lanes: HashMap<String, mpsc::UnboundedSender<LaneItem>>,
    joins: broadcast::Sender<NodeInfo>,
}

impl NodeActor {
    /// A node that hosts collections, announced as `node`.
    pub fn host(name: impl Into<String>, config: NodeConfig, transport: Transport) -> (Self, NodeClient) {
        Self::new(name.into(), NodeKind::Node, config, transport)
    }

    /// A worker named `<base>-<uuid>`, announced as `worker`.
    pub fn worker(base: &str, config: NodeConfig, transport: Transport) -> (Self, NodeClient) {
        Self::new(worker_name(base), NodeKind::Worker, config, transport)
    }

    fn new(name: String, kind: NodeKind, config: NodeConfig, transport: Transport) -> (Self, NodeClient) {
        let (sender, requests) = mpsc::channel(config.inbox_capacity.max(1));
        let (joins, _) = broadcast::channel(config.inbox_capacity.max(1));
        let Transport {
            medium,
            inbound,
            loopback,
        } = transport;

        let node = Self {
            name,
            kind,
            config,
            medium,
            inbound,
            loopback,
            requests,
            handle: sender.downgrade(),
            collections: HashMap::new(),
            pending: Vec::new(),
            nodes: NodesDirectory::new(),
            resources: ResourceDirectory::new(),
            workers: WorkerDirectory::new(),
            rules: RuleBook::new(),
            lanes: HashMap::new(),
            joins,
        };
        (node, NodeClient::new(sender))
    }

    pub fn node_id(&self) -> &NodeId {
        self.medium.node_id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hosts a collection on this node. Collections start with the node and
    /// cannot be added afterwards; workers host none.
    pub fn register_collection(&mut self, name: impl Into<String>, storage: impl Storage) -> Result<()> {
        let name = name.into();
        if self.kind == NodeKind::Worker {
            return Err(MeshError::Misconfigured(format!(
                "worker {} cannot host collection {}",
                self.name, name
            )));
        }
        if self.collections.contains_key(&name) {
            return Err(MeshError::Misconfigured(format!("collection {} registered twice", name)));
        }

        let publisher = EventPublisher::new(self.medium.clone(), self.loopback.clone());
        let (actor, client) = CollectionActor::new(
            name.clone(),
            self.config.collection_buffer,
            Box::new(storage),
            publisher,
        );
        self.collections.insert(name, client);
        self.pending.push(actor);
        Ok(())
    }

    /// Subscribes to peer joins before the node runs, so no early join is missed.
    pub fn peer_joins(&self) -> broadcast::Receiver<NodeInfo> {
        self.joins.subscribe()
    }

    /// Adds a rule before the node runs. The topic subscription happens at start-up.
    pub fn register_rule(&mut self, resource_type: &str, matcher: Matcher, callback: impl RuleCallback) {
        self.rules.push(resource_type, Rule::new(matcher, callback));
    }

    /// Runs the node until a shutdown request arrives or every client is dropped.
    pub async fn run(mut self) {
        info!(node = %self.node_id(), name = %self.name, kind = ?self.kind, "Node started");

        for actor in self.pending.drain(..) {
            tokio::spawn(actor.run());
        }
        for resource_type in self.rules.resource_types() {
            self.subscribe(&resource_type).await;
        }
        if let Err(e) = self.medium.register(self.service_info()).await {
            warn!(node = %self.node_id(), error = %e, "Announcement failed");
        }

        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(NodeRequest::Shutdown { respond_to }) => {
                        self.close().await;
                        let _ = respond_to.send(());
                        break;
                    }
                    Some(request) => self.on_request(request).await,
                    None => {
                        self.close().await;
                        break;
                    }
                },
                Some(inbound) = self.inbound.recv() => self.on_inbound(inbound).await,
                _ = ticker.tick() => {
                    if !self.rules.is_empty() {
                        self.spawn_cycle(None);
                    }
                }
            }
        }

        info!(node = %self.node_id(), name = %self.name, peers = self.nodes.peer_count(), "Shutdown");
    }

    async fn on_request(&mut self, request: NodeRequest) {
        match request {
            NodeRequest::Send { message, respond_to } => self.route(message, respond_to),
            NodeRequest::SendToNode {
                node_id,
                message,
                respond_to,
            } => self.send_to_node(&node_id, message, respond_to),
            NodeRequest::Register {
                resource_type,
                rule,
                respond_to,
            } => {
                if self.rules.push(&resource_type, rule) {
                    info!(node = %self.node_id(), %resource_type, "First rule for type");
                }
                self.subscribe(&resource_type).await;
                let _ = respond_to.send(Ok(()));
            }
            NodeRequest::Info { respond_to } => {
                let _ = respond_to.send(self.service_info());
            }
            NodeRequest::Directory { respond_to } => {
                let _ = respond_to.send(self.resources.snapshot());
            }
            NodeRequest::KnownWorkers { respond_to } => {
                let _ = respond_to.send(self.workers.known_workers());
            }
            NodeRequest::PeerJoins { respond_to } => {
                let _ = respond_to.send(self.joins.subscribe());
            }
            NodeRequest::PollCheck { respond_to } => self.spawn_cycle(Some(respond_to)),
            NodeRequest::Shutdown { respond_to } => {
                // Handled by the loop; kept exhaustive.
                let _ = respond_to.send(());
            }
        }
    }

    /// Local collection first, then the owner from the directory.
    fn route(&self, message: CrudMessage, respond_to: Response<Value>) {
        if let Some(collection) = self.collections.get(&message.collection) {
            debug!(collection = %message.collection, action = %message.action, "Local dispatch");
            let collection = collection.clone();
            tokio::spawn(async move {
                let _ = respond_to.send(collection.call(message).await.into_result());
            });
            return;
        }

        match self.resources.owner(&message.collection).cloned() {
            Some(owner) => {
                debug!(collection = %message.collection, action = %message.action, %owner, "Remote dispatch");
                self.send_to_node(&owner, message, respond_to);
            }
            None => {
                debug!(collection = %message.collection, "No owner known");
                let _ = respond_to.send(Err(MeshError::UnknownService(message.collection)));
            }
        }
    }

    /// Remote call to a known peer, bounded by the request timeout.
    fn send_to_node(&self, node_id: &NodeId, message: CrudMessage, respond_to: Response<Value>) {
        let Some(peer) = self.nodes.get(node_id).cloned() else {
            let _ = respond_to.send(Err(MeshError::UnknownNode(node_id.to_string())));
            return;
        };

        let medium = self.medium.clone();
        let timeout = self.config.request_timeout;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, medium.send(&peer, message)).await {
                Ok(Ok(envelope)) => envelope.into_result(),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(MeshError::Timeout {
                    node: peer.node_id.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }),
            };
            if let Err(e) = &result {
                if e.is_transport() {
                    warn!(peer = %peer.node_id, error = %e, "Peer unreachable");
                }
            }
            let _ = respond_to.send(result);
        });
    }

    async fn on_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Message {
                message,
                respond_to,
            } => self.on_peer_message(message, respond_to),
            Inbound::Event { topic, event } => {
                debug!(%topic, "Event received");
                self.on_event(event);
            }
            Inbound::Registration(info) => self.on_registration(info).await,
        }
    }

    fn on_peer_message(&self, message: CrudMessage, respond_to: oneshot::Sender<Envelope>) {
        let Some(collection) = self.collections.get(&message.collection).cloned() else {
            warn!(collection = %message.collection, "Message for a collection not hosted here");
            let reply = MeshError::NoCollection(message.collection).to_string();
            let _ = respond_to.send(Envelope::failure(reply));
            return;
        };
        tokio::spawn(async move {
            let _ = respond_to.send(collection.call(message).await);
        });
    }

    fn on_event(&mut self, event: Event) {
        let rules = self.rules.for_type(&event.resource_name).to_vec();
        if rules.is_empty() {
            return;
        }

        let item = LaneItem { event, rules };
        let item = match self.lanes.get(&item.event.resource_name) {
            Some(lane) => match lane.send(item) {
                Ok(()) => return,
                Err(mpsc::error::SendError(item)) => {
                    warn!(collection = %item.event.resource_name, "Event lane stopped, restarting");
                    item
                }
            },
            None => item,
        };

        let collection = item.event.resource_name.clone();
        let lane = worker::spawn_lane(&collection, self.handle.clone());
        if lane.send(item).is_err() {
            warn!(%collection, "Event lane unavailable, event dropped");
        }
        self.lanes.insert(collection, lane);
    }

    async fn on_registration(&mut self, info: NodeInfo) {
        if &info.node_id == self.node_id() {
            return;
        }
        if !self.nodes.insert(info.clone()) {
            debug!(peer = %info.node_id, "Known peer registered again");
            return;
        }
        info!(peer = %info.node_id, name = %info.name, kind = ?info.node_type, "Peer joined");

        match info.node_type {
            NodeKind::Node => {
                for name in &info.resources {
                    self.resources
                        .merge(name, &info.node_id, self.config.conflict_policy);
                }
            }
            NodeKind::Worker => {
                for resource_type in &info.resources {
                    if self.collections.contains_key(resource_type) {
                        self.workers.add(resource_type, info.clone());
                    }
                }
            }
        }

        if let Err(e) = self
            .medium
            .send_registration_answer(&info, self.service_info())
            .await
        {
            warn!(peer = %info.node_id, error = %e, "Registration answer failed");
        }
        if let Err(e) = self.medium.connect_to_node(&info).await {
            warn!(peer = %info.node_id, error = %e, "Connection failed");
        }
        let _ = self.joins.send(info);
    }

    /// Spawns a reconciliation cycle so a slow one never holds up the loop or the next tick.
    fn spawn_cycle(&self, respond_to: Option<oneshot::Sender<CycleReport>>) {
        let pairs = self.rules.pairs();
        let Some(sender) = self.handle.upgrade() else {
            return;
        };
        let client = NodeClient::new(sender);
        tokio::spawn(async move {
            let report = worker::run_cycle(&client, pairs).await;
            if let Some(respond_to) = respond_to {
                let _ = respond_to.send(report);
            }
        });
    }

    async fn subscribe(&self, resource_type: &str) {
        if let Err(e) = self.medium.subscribe(resource_type).await {
            warn!(node = %self.node_id(), %resource_type, error = %e, "Subscription failed");
        }
    }

    /// What this node announces: hosted collections for a node, rule types for a worker.
    fn service_info(&self) -> NodeInfo {
        let resources = match self.kind {
            NodeKind::Node => {
                let mut names: Vec<String> = self.collections.keys().cloned().collect();
                names.sort();
                names
            }
            NodeKind::Worker => self.rules.resource_types(),
        };
        NodeInfo {
            node_id: self.node_id().clone(),
            name: self.name.clone(),
            resources,
            node_type: self.kind,
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.medium.close().await {
            warn!(node = %self.node_id(), error = %e, "Closing medium failed");
        }
        self.collections.clear();
        self.lanes.clear();
    }
}
