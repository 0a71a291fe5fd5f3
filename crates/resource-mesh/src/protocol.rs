//! # Resource & Collection Protocol
//!
//! Maps an inbound action name to a handler through explicit operation tables.
//! A message carrying a `resource_id` is looked up in the resource table,
//! one without in the collection table. Anything not listed is rejected with
//! [`MeshError::NoHandler`], so the remote message surface can only reach the
//! operations enumerated here.

use crate::error::{MeshError, Result};
use crate::model::{Document, Matcher};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Operations addressed to a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOp {
    Create,
    Get,
    Patch,
    Delete,
    AddLink,
}

impl ResourceOp {
    const TABLE: [(&'static str, ResourceOp); 5] = [
        ("create", ResourceOp::Create),
        ("get", ResourceOp::Get),
        ("patch", ResourceOp::Patch),
        ("delete", ResourceOp::Delete),
        ("add_link", ResourceOp::AddLink),
    ];

    pub fn lookup(action: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(name, _)| *name == action)
            .map(|(_, op)| *op)
    }

    pub fn name(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(_, op)| *op == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// Whether a successful call changes stored state and publishes an event.
    pub fn is_mutating(self) -> bool {
        !matches!(self, ResourceOp::Get)
    }
}

/// Operations addressed to a collection as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOp {
    List,
}

impl CollectionOp {
    pub fn lookup(action: &str) -> Option<Self> {
        match action {
            "list" => Some(CollectionOp::List),
            _ => None,
        }
    }
}

/// A resolved entry of one of the operation tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Resource { op: ResourceOp, resource_id: String },
    Collection(CollectionOp),
}

impl Operation {
    /// Picks the table from the presence of a resource id and looks the action
    /// up in it. An empty id counts as absent.
    pub fn resolve(action: &str, resource_id: Option<&str>) -> Result<Self> {
        let resolved = match resource_id.filter(|id| !id.is_empty()) {
            Some(id) => ResourceOp::lookup(action).map(|op| Operation::Resource {
                op,
                resource_id: id.to_string(),
            }),
            None => CollectionOp::lookup(action).map(Operation::Collection),
        };
        resolved.ok_or_else(|| MeshError::NoHandler(action.to_string()))
    }
}

// --- Parameters ---

#[derive(Debug, Clone, Deserialize)]
pub struct CreateParams {
    pub resource_data: Document,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchParams {
    pub patch: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddLinkParams {
    pub relation: String,
    pub target_id: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    #[serde(rename = "where", default)]
    pub filter: Option<Matcher>,
}

/// Decodes the flattened message parameters into the typed parameters of `action`.
pub fn decode_params<P: DeserializeOwned>(action: &str, params: Map<String, Value>) -> Result<P> {
    serde_json::from_value(Value::Object(params)).map_err(|e| MeshError::invalid_params(action, e))
}

/// A partial update in the `$set` / `$unset` operator style.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Patch {
    #[serde(rename = "$set", default)]
    pub set: Document,
    #[serde(rename = "$unset", default)]
    pub unset: Document,
}

impl Patch {
    pub fn parse(raw: &Value) -> Result<Self> {
        Patch::deserialize(raw).map_err(|e| MeshError::invalid_params("patch", e))
    }

    /// Applies the patch in place: `$unset` keys are removed, then `$set` keys
    /// overwrite. Keys named in neither are preserved.
    pub fn apply(&self, document: &mut Document) {
        for key in self.unset.keys() {
            document.remove(key);
        }
        for (key, value) in &self.set {
            document.insert(key.clone(), value.clone());
        }
    }
}
