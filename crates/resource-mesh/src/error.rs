//! # Mesh Errors
//!
//! This module defines the error taxonomy shared by routing, dispatch and the
//! rule engine. Keeping a single enum means a caller of
//! [`NodeClient::send`](crate::NodeClient::send) can tell apart "nobody owns this
//! collection", "the owner rejected the operation" and "the owner could not be
//! reached" with one `match`.

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur while routing, dispatching or reconciling resources.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    /// No node (local or remote) is known to own the collection.
    #[error("Unknown service {0}")]
    UnknownService(String),

    /// A direct send named a node id missing from the nodes directory.
    #[error("Unknown node {0}")]
    UnknownNode(String),

    /// The action is not in the operation table of the addressed target.
    #[error("No handler for action {0}")]
    NoHandler(String),

    /// An inbound message named a collection this node does not host.
    #[error("No collection named {0}")]
    NoCollection(String),

    /// The addressed resource does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A create targeted an id that is already taken.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// The message parameters do not fit the action.
    #[error("Invalid parameters for {action}: {reason}")]
    InvalidParams { action: String, reason: String },

    /// A stored document has a shape the operation cannot work with.
    #[error("Invalid document {resource_id}: {reason}")]
    InvalidDocument { resource_id: String, reason: String },

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A response payload could not be decoded into the expected type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The node was wired in a way it cannot serve.
    #[error("Misconfigured node: {0}")]
    Misconfigured(String),

    /// A dispatch failed on the owning node. Carries only the message text.
    #[error("{0}")]
    Application(String),

    /// The peer could not be reached.
    #[error("Service {node} is unavailable: {reason}")]
    Unavailable { node: String, reason: String },

    /// The peer did not answer within the request timeout.
    #[error("Request to {node} timed out after {timeout_ms}ms")]
    Timeout { node: String, timeout_ms: u64 },

    #[error("Node closed")]
    NodeClosed,

    #[error("Node dropped response channel")]
    NodeDropped,

    #[error("Collection {0} closed")]
    CollectionClosed(String),

    /// A rule callback panicked or was cancelled.
    #[error("Rule callback for {resource_type} failed: {reason}")]
    CallbackFailed { resource_type: String, reason: String },
}

impl MeshError {
    /// True when the operation could not be attempted at all, as opposed to
    /// having been attempted and failed.
    pub fn is_transport(&self) -> bool {
        matches!(self, MeshError::Unavailable { .. } | MeshError::Timeout { .. })
    }

    pub(crate) fn invalid_params(action: &str, reason: impl ToString) -> Self {
        MeshError::InvalidParams {
            action: action.to_string(),
            reason: reason.to_string(),
        }
    }
}
