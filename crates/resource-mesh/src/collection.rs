//! # Collection Actor
//!
//! A [`CollectionActor`] owns one collection's storage and processes its
//! messages sequentially, so the read-modify-write of `patch` and `add_link`
//! needs no locking. The [`CollectionClient`] half is cheap to clone and is what
//! the node hands inbound and local messages to.
//!
//! The actor is also the dispatch boundary: whatever a handler returns, the
//! caller only ever receives an [`Envelope`].

use crate::error::{MeshError, Result};
use crate::message::{CrudMessage, Envelope};
use crate::model::Matcher;
use crate::protocol::{decode_params, CollectionOp, ListParams, Operation, ResourceOp};
use crate::publisher::EventPublisher;
use crate::resource::Resource;
use crate::storage::Storage;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// A message waiting for its envelope.
#[derive(Debug)]
pub struct CollectionRequest {
    pub message: CrudMessage,
    pub respond_to: oneshot::Sender<Envelope>,
}

/// The server half of a collection.
///
/// **Concurrency Model**: one message at a time, in arrival order. Handlers
/// may await storage and the publisher but never another collection, so two
/// collections can never wait on each other.
pub struct CollectionActor {
    name: String,
    receiver: mpsc::Receiver<CollectionRequest>,
    storage: Box<dyn Storage>,
    publisher: EventPublisher,
}

impl CollectionActor {
    /// Creates a collection actor and its client.
    ///
    /// # Arguments
    ///
    /// * `name` - The resource-collection name messages are routed by.
    /// * `buffer_size` - Capacity of the request channel.
    /// * `storage` - The backend holding the documents.
    /// * `publisher` - Where mutation events go.
    pub fn new(
        name: impl Into<String>,
        buffer_size: usize,
        storage: Box<dyn Storage>,
        publisher: EventPublisher,
    ) -> (Self, CollectionClient) {
        let name = name.into();
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let actor = Self {
            name: name.clone(),
            receiver,
            storage,
            publisher,
        };
        (actor, CollectionClient::new(name, sender))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the message loop until every client is dropped.
    pub async fn run(mut self) {
        info!(collection = %self.name, "Collection started");

        while let Some(CollectionRequest {
            message,
            respond_to,
        }) = self.receiver.recv().await
        {
            let action = message.action.clone();
            let envelope = match self.on_message(message).await {
                Ok(data) => {
                    debug!(collection = %self.name, %action, "Success");
                    Envelope::ok(data)
                }
                Err(e) => {
                    warn!(collection = %self.name, %action, error = %e, "Dispatch failed");
                    Envelope::failure(e.to_string())
                }
            };
            let _ = respond_to.send(envelope);
        }

        let size = self.storage.len().await;
        info!(collection = %self.name, size, "Shutdown");
    }

    /// Looks the action up in the operation tables and runs the handler.
    async fn on_message(&mut self, message: CrudMessage) -> Result<Value> {
        let CrudMessage {
            action,
            resource_id,
            params,
            ..
        } = message;
        debug!(collection = %self.name, %action, ?resource_id, "Dispatch");

        match Operation::resolve(&action, resource_id.as_deref())? {
            Operation::Resource { op, resource_id } => {
                let resource = Resource::new(
                    &resource_id,
                    &self.name,
                    self.storage.as_mut(),
                    &self.publisher,
                );
                match op {
                    ResourceOp::Create => resource.create(decode_params(&action, params)?).await,
                    ResourceOp::Get => resource.get().await,
                    ResourceOp::Patch => resource.patch(decode_params(&action, params)?).await,
                    ResourceOp::Delete => resource.delete().await,
                    ResourceOp::AddLink => {
                        resource.add_link(decode_params(&action, params)?).await
                    }
                }
            }
            Operation::Collection(CollectionOp::List) => {
                let params: ListParams = decode_params(&action, params)?;
                self.list(params.filter.unwrap_or_default()).await
            }
        }
    }

    /// All resources, or those whose document satisfies `filter`. Unordered.
    async fn list(&self, filter: Matcher) -> Result<Value> {
        let records = self.storage.find(&filter).await?;
        debug!(collection = %self.name, count = records.len(), "List");
        serde_json::to_value(records).map_err(|e| MeshError::Storage(e.to_string()))
    }
}

/// A cloneable handle on a [`CollectionActor`].
#[derive(Clone, Debug)]
pub struct CollectionClient {
    name: String,
    sender: mpsc::Sender<CollectionRequest>,
}

impl CollectionClient {
    pub fn new(name: impl Into<String>, sender: mpsc::Sender<CollectionRequest>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dispatches `message` and waits for its envelope. A collection that is
    /// gone answers with a failed envelope like any other failure.
    pub async fn call(&self, message: CrudMessage) -> Envelope {
        match self.try_call(message).await {
            Ok(envelope) => envelope,
            Err(e) => Envelope::failure(e.to_string()),
        }
    }

    async fn try_call(&self, message: CrudMessage) -> Result<Envelope> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CollectionRequest {
                message,
                respond_to,
            })
            .await
            .map_err(|_| MeshError::CollectionClosed(self.name.clone()))?;
        response
            .await
            .map_err(|_| MeshError::CollectionClosed(self.name.clone()))
    }
}
