//! # ResourceApi Trait
//!
//! Typed CRUD calls on top of the raw message surface. Implementors only
//! provide [`ResourceApi::dispatch`]; the operations decode the payloads the
//! resource handlers answer with.
//!
//! ```rust
//! use resource_mesh::{MemoryNetwork, MemoryStorage, NodeActor, NodeConfig, ResourceApi};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let network = MemoryNetwork::new();
//!     let (mut node, client) =
//!         NodeActor::host("host", NodeConfig::default(), network.attach(16).await);
//!     node.register_collection("tasks", MemoryStorage::new()).unwrap();
//!     tokio::spawn(node.run());
//!
//!     let data = json!({"title": "write docs"}).as_object().cloned().unwrap();
//!     client.create("tasks", "t1", data).await.unwrap();
//!     assert!(client.get("tasks", "t1").await.unwrap().is_some());
//!     assert!(client.delete("tasks", "t1").await.unwrap());
//!     assert!(client.get("tasks", "t1").await.unwrap().is_none());
//! }
//! ```

use crate::client::NodeClient;
use crate::collection::CollectionClient;
use crate::error::{MeshError, Result};
use crate::message::{CrudMessage, NOT_FOUND, OK};
use crate::model::{Document, Matcher, ResourceRecord};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| MeshError::Decode(e.to_string()))
}

fn expect_marker(action: &str, value: &Value) -> Result<bool> {
    match value.as_str() {
        Some(OK) => Ok(true),
        Some(NOT_FOUND) => Ok(false),
        _ => Err(MeshError::Decode(format!(
            "unexpected {} reply: {}",
            action, value
        ))),
    }
}

#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Sends the raw message and unwraps the answering envelope.
    async fn dispatch(&self, message: CrudMessage) -> Result<Value>;

    /// Creates `resource_id` and returns the id the collection stored it under.
    #[tracing::instrument(skip(self, resource_data))]
    async fn create(&self, collection: &str, resource_id: &str, resource_data: Document) -> Result<String> {
        let message = CrudMessage::new(collection, "create")
            .with_id(resource_id)
            .with_param("resource_data", Value::Object(resource_data));
        let reply = self.dispatch(message).await?;
        reply
            .get("resource_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| MeshError::Decode(format!("unexpected create reply: {}", reply)))
    }

    /// `None` when the resource does not exist.
    #[tracing::instrument(skip(self))]
    async fn get(&self, collection: &str, resource_id: &str) -> Result<Option<ResourceRecord>> {
        tracing::debug!("Sending request");
        let reply = self
            .dispatch(CrudMessage::new(collection, "get").with_id(resource_id))
            .await?;
        if reply.as_str() == Some(NOT_FOUND) {
            return Ok(None);
        }
        decode(reply).map(Some)
    }

    /// Applies a `$set`/`$unset` patch and returns the merged document.
    #[tracing::instrument(skip(self, patch))]
    async fn patch(&self, collection: &str, resource_id: &str, patch: Value) -> Result<Document> {
        let message = CrudMessage::new(collection, "patch")
            .with_id(resource_id)
            .with_param("patch", patch);
        decode(self.dispatch(message).await?)
    }

    /// True if the resource existed and was removed.
    #[tracing::instrument(skip(self))]
    async fn delete(&self, collection: &str, resource_id: &str) -> Result<bool> {
        tracing::debug!("Sending request");
        let reply = self
            .dispatch(CrudMessage::new(collection, "delete").with_id(resource_id))
            .await?;
        expect_marker("delete", &reply)
    }

    #[tracing::instrument(skip(self))]
    async fn add_link(
        &self,
        collection: &str,
        resource_id: &str,
        relation: &str,
        target_id: &str,
        title: &str,
    ) -> Result<()> {
        let message = CrudMessage::new(collection, "add_link")
            .with_id(resource_id)
            .with_param("relation", Value::from(relation))
            .with_param("target_id", Value::from(target_id))
            .with_param("title", Value::from(title));
        let reply = self.dispatch(message).await?;
        expect_marker("add_link", &reply).map(|_| ())
    }

    /// Every resource, or those matching `filter`. Order is unspecified.
    #[tracing::instrument(skip(self))]
    async fn list(&self, collection: &str, filter: Option<Matcher>) -> Result<Vec<ResourceRecord>> {
        let mut message = CrudMessage::new(collection, "list");
        if let Some(filter) = filter {
            message = message.with_param("where", Value::Object(filter));
        }
        decode(self.dispatch(message).await?)
    }
}

/// Routed through the node: local collection or owning peer.
#[async_trait]
impl ResourceApi for NodeClient {
    async fn dispatch(&self, message: CrudMessage) -> Result<Value> {
        self.send(message).await
    }
}

/// Straight to one collection, without routing.
#[async_trait]
impl ResourceApi for CollectionClient {
    async fn dispatch(&self, message: CrudMessage) -> Result<Value> {
        if message.collection != self.name() {
            return Err(MeshError::NoCollection(message.collection));
        }
        self.call(message).await.into_result()
    }
}
