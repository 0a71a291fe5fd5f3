//! # Resource Handlers
//!
//! The five operations of the resource table. A [`Resource`] is a short-lived
//! view of one id inside a collection, created per message by the collection
//! actor. Every successful mutation publishes an event carrying the
//! collection name and the resource id.

use crate::error::{MeshError, Result};
use crate::message::{NOT_FOUND, OK};
use crate::model::{Document, Link, ResourceRecord, LINKS_FIELD};
use crate::protocol::{AddLinkParams, CreateParams, Patch, PatchParams};
use crate::publisher::EventPublisher;
use crate::storage::Storage;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

pub struct Resource<'a> {
    id: &'a str,
    collection: &'a str,
    storage: &'a mut dyn Storage,
    publisher: &'a EventPublisher,
}

impl<'a> Resource<'a> {
    pub fn new(
        id: &'a str,
        collection: &'a str,
        storage: &'a mut dyn Storage,
        publisher: &'a EventPublisher,
    ) -> Self {
        Self {
            id,
            collection,
            storage,
            publisher,
        }
    }

    /// Stores the document under the caller-supplied id. Returns `{resource_id}`.
    pub async fn create(mut self, params: CreateParams) -> Result<Value> {
        self.storage.insert(self.id, params.resource_data.clone()).await?;
        info!(collection = self.collection, resource_id = self.id, "Created");

        let mut payload = Map::new();
        payload.insert("resource_data".into(), Value::Object(params.resource_data));
        self.publish("create", payload).await;

        Ok(json!({ "resource_id": self.id }))
    }

    /// Returns `{resource_id, resource_data}`, or the not-found marker.
    pub async fn get(self) -> Result<Value> {
        match self.storage.find_one(self.id).await? {
            Some(document) => {
                let record = ResourceRecord::new(self.id, document);
                serde_json::to_value(record).map_err(|e| MeshError::Storage(e.to_string()))
            }
            None => {
                debug!(collection = self.collection, resource_id = self.id, "Not found");
                Ok(Value::String(NOT_FOUND.into()))
            }
        }
    }

    /// Applies the patch and returns the full merged document. The event
    /// carries the raw patch, not the merged result.
    pub async fn patch(mut self, params: PatchParams) -> Result<Value> {
        let patch = Patch::parse(&params.patch)?;
        let mut document = self.load().await?;
        patch.apply(&mut document);
        self.storage.save(self.id, document.clone()).await?;
        info!(collection = self.collection, resource_id = self.id, "Patched");

        let mut payload = Map::new();
        payload.insert("patch".into(), params.patch);
        self.publish("patch", payload).await;

        Ok(Value::Object(document))
    }

    /// Removes the resource. Deleting an absent id answers the not-found
    /// marker and publishes nothing.
    pub async fn delete(mut self) -> Result<Value> {
        if !self.storage.remove(self.id).await? {
            debug!(collection = self.collection, resource_id = self.id, "Delete of absent resource");
            return Ok(Value::String(NOT_FOUND.into()));
        }
        info!(collection = self.collection, resource_id = self.id, "Deleted");
        self.publish("delete", Map::new()).await;
        Ok(Value::String(OK.into()))
    }

    /// Appends `{target_id, title}` to `_links[relation]`, creating the list on
    /// first use.
    pub async fn add_link(mut self, params: AddLinkParams) -> Result<Value> {
        let mut document = self.load().await?;
        let link = Link {
            target_id: params.target_id,
            title: params.title,
        };
        self.append_link(&mut document, &params.relation, &link)?;
        self.storage.save(self.id, document).await?;
        info!(
            collection = self.collection,
            resource_id = self.id,
            relation = %params.relation,
            "Link added"
        );

        let mut payload = Map::new();
        payload.insert("target_id".into(), Value::String(link.target_id));
        payload.insert("title".into(), Value::String(link.title));
        self.publish("add_link", payload).await;

        Ok(Value::String(OK.into()))
    }

    async fn load(&self) -> Result<Document> {
        self.storage
            .find_one(self.id)
            .await?
            .ok_or_else(|| MeshError::NotFound(self.id.to_string()))
    }

    fn append_link(&self, document: &mut Document, relation: &str, link: &Link) -> Result<()> {
        let invalid = |reason: &str| MeshError::InvalidDocument {
            resource_id: self.id.to_string(),
            reason: reason.to_string(),
        };

        let links = document
            .entry(LINKS_FIELD)
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| invalid("_links is not an object"))?;
        let relation_links = links
            .entry(relation)
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| invalid("relation links are not a list"))?;
        relation_links.push(json!({ "target_id": link.target_id, "title": link.title }));
        Ok(())
    }

    async fn publish(&self, action: &str, payload: Map<String, Value>) {
        self.publisher
            .publish_resource(self.collection, action, self.id, payload)
            .await;
    }
}
