//! # Data Model
//!
//! Plain data shared by every layer: documents, matchers, node identity and
//! resource records. None of these types carry behaviour beyond construction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A resource document: field name to JSON value.
pub type Document = Map<String, Value>;

/// A field-equality predicate: field name to expected value.
pub type Matcher = Map<String, Value>;

/// Field of a document holding its relation links.
pub const LINKS_FIELD: &str = "_links";

/// Unique identity of a node in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Generates a fresh random id.
    ///
    /// This is the only source of node identity; nothing else in the crate
    /// mints ids, so uniqueness rests entirely on the UUID generator.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Hosts resource collections.
    Node,
    /// Hosts no collections; reacts to other nodes' events through rules.
    Worker,
}

/// What a node announces about itself when it registers.
///
/// For a [`NodeKind::Node`], `resources` lists the collections it hosts. For a
/// [`NodeKind::Worker`], it lists the resource types it has rules for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub name: String,
    pub resources: Vec<String>,
    pub node_type: NodeKind,
}

/// Builds a worker's display name from a shared base name.
///
/// Several workers may run under one logical role; the UUID suffix keeps them
/// apart in worker directories and transport addressing.
pub fn worker_name(base: &str) -> String {
    format!("{}-{}", base, uuid::Uuid::new_v4())
}

/// One entry of a `_links` relation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub target_id: String,
    pub title: String,
}

/// A resource as returned by `get` and `list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub resource_id: String,
    pub resource_data: Document,
}

impl ResourceRecord {
    pub fn new(resource_id: impl Into<String>, resource_data: Document) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_data,
        }
    }

    /// Links stored under `relation`, in insertion order.
    pub fn links(&self, relation: &str) -> Vec<Link> {
        self.resource_data
            .get(LINKS_FIELD)
            .and_then(|links| links.get(relation))
            .and_then(|list| serde_json::from_value(list.clone()).ok())
            .unwrap_or_default()
    }
}
