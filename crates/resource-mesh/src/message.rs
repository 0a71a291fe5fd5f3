//! # Wire Messages
//!
//! The shapes that cross node boundaries: CRUD requests, the `{success, data}`
//! envelope every dispatch answers with, and resource events.

use crate::error::{MeshError, Result};
use crate::model::Document;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::oneshot;

/// Success marker returned by `delete` and `add_link`.
pub const OK: &str = "OK";

/// Marker returned by `get` (and a repeated `delete`) when the resource does
/// not exist. Distinct from both success payloads and failed envelopes.
pub const NOT_FOUND: &str = "NOK";

/// Action label passed to rule callbacks fired by reconciliation.
pub const PERIODIC: &str = "periodic";

/// Type alias for the one-shot response channel used by actors.
pub type Response<T> = oneshot::Sender<Result<T>>;

/// A CRUD request addressed to a collection.
///
/// On the wire the action-specific parameters sit next to the routing fields:
/// `{"collection": "tasks", "action": "patch", "resource_id": "t1", "patch": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrudMessage {
    pub collection: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl CrudMessage {
    pub fn new(collection: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            action: action.into(),
            resource_id: None,
            params: Map::new(),
        }
    }

    pub fn with_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// The result wrapper of every dispatch, local or remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub data: Value,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::String(message.into()),
        }
    }

    /// Unwraps the payload, turning a failed envelope into
    /// [`MeshError::Application`] with the remote message text.
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            return Ok(self.data);
        }
        let message = match self.data {
            Value::String(message) => message,
            other => other.to_string(),
        };
        Err(MeshError::Application(message))
    }
}

/// Notification of a resource mutation.
///
/// Action-specific fields (`resource_data`, `patch`, `target_id`, `title`) are
/// flattened into `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub resource_name: String,
    pub resource_id: String,
    pub action: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Event {
    /// The document carried by the event, if any. Anything that is not an
    /// object counts as "no document available".
    pub fn resource_data(&self) -> Option<&Document> {
        self.payload.get("resource_data").and_then(Value::as_object)
    }

    pub fn is_delete(&self) -> bool {
        self.action == "delete"
    }
}

/// Builds the topic a resource event is published under:
/// `<collection>.<action>.<resource_id>`.
pub fn event_topic(collection: &str, action: &str, resource_id: &str) -> String {
    [collection, action, resource_id].join(".")
}
