//! # Resource Mesh
//!
//! A framework for clusters of autonomous nodes that together own named
//! resource collections. Any node can address any collection: a message is
//! dispatched locally when the node hosts the collection and forwarded to the
//! owner otherwise. Worker nodes react to resource mutations through
//! declarative rules, and a periodic reconciliation sweep makes up for events
//! lost in transit.
//!
//! ## Architecture Overview
//!
//! Every moving part is an actor: a task owning its state and a channel,
//! paired with a cheap-to-clone client.
//!
//! 1. **Collections** ([`CollectionActor`]) - one per hosted collection. Owns a
//!    [`Storage`] backend, runs the allow-listed operation table and publishes
//!    an [`Event`] after every mutation.
//! 2. **Nodes** ([`NodeActor`]) - the control loop of a cluster member. Holds
//!    the resource, worker and nodes directories, routes messages, handles peer
//!    registration and drives the rule engine.
//! 3. **Clients** ([`NodeClient`], [`CollectionClient`]) - the async API. The
//!    [`ResourceApi`] trait adds typed CRUD calls to both.
//!
//! Nodes talk through a [`Medium`]. [`MemoryNetwork`] connects nodes of one
//! process; [`mock::MockMedium`] scripts a medium for tests.
//!
//! ## Quick Start
//!
//! ```rust
//! use resource_mesh::{
//!     MemoryNetwork, MemoryStorage, NodeActor, NodeConfig, ResourceApi, RuleHit,
//! };
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//!
//! #[tokio::main]
//! async fn main() {
//!     let network = MemoryNetwork::new();
//!     let config = NodeConfig::default();
//!
//!     // A host owning `tasks`.
//!     let (mut host, host_client) =
//!         NodeActor::host("host", config.clone(), network.attach(config.inbox_capacity).await);
//!     host.register_collection("tasks", MemoryStorage::new()).unwrap();
//!
//!     // A worker reacting to open tasks.
//!     let seen = Arc::new(Mutex::new(Vec::new()));
//!     let sink = seen.clone();
//!     let (mut worker, worker_client) =
//!         NodeActor::worker("notifier", config.clone(), network.attach(config.inbox_capacity).await);
//!     worker.register_rule(
//!         "tasks",
//!         json!({"state": "open"}).as_object().cloned().unwrap(),
//!         move |hit: RuleHit| sink.lock().unwrap().push(hit.resource_id),
//!     );
//!
//!     let mut joins = worker.peer_joins();
//!     tokio::spawn(host.run());
//!     tokio::spawn(worker.run());
//!     joins.recv().await.unwrap();
//!
//!     // Reconciliation finds the task wherever it was created.
//!     let data = json!({"state": "open"}).as_object().cloned().unwrap();
//!     host_client.create("tasks", "t1", data).await.unwrap();
//!     let report = worker_client.poll_check().await.unwrap();
//!     assert_eq!(report.hits, 1);
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`query`] - the field-equality matcher shared by listing and rules
//! - [`protocol`] - operation tables, parameters and patches
//! - [`collection`] / [`resource`] - the dispatch boundary and the handlers
//! - [`node`] / [`client`] - routing, registration, the control loop
//! - [`rules`] / [`worker`] - rules, event lanes, reconciliation
//! - [`transport`] - the medium abstraction and the in-memory network
//! - [`config`] / [`tracing`] - settings and logging setup

pub mod client;
pub mod client_trait;
pub mod collection;
pub mod config;
pub mod directory;
pub mod error;
pub mod message;
pub mod mock;
pub mod model;
pub mod node;
pub mod protocol;
pub mod publisher;
pub mod query;
pub mod resource;
pub mod rules;
pub mod storage;
pub mod tracing;
pub mod transport;
pub mod worker;

pub use client::NodeClient;
pub use client_trait::ResourceApi;
pub use collection::{CollectionActor, CollectionClient};
pub use config::{ConflictPolicy, NodeConfig};
pub use error::{MeshError, Result};
pub use message::{CrudMessage, Envelope, Event, NOT_FOUND, OK, PERIODIC};
pub use model::{Document, Link, Matcher, NodeId, NodeInfo, NodeKind, ResourceRecord};
pub use node::NodeActor;
pub use rules::{Rule, RuleCallback, RuleHit};
pub use storage::{MemoryStorage, Storage};
pub use transport::memory::MemoryNetwork;
pub use transport::{Inbound, Medium, Transport};
pub use worker::CycleReport;
