//! # Storage Capability
//!
//! The document store behind a collection. A collection actor owns its
//! storage exclusively, so implementations take `&mut self` for writes and need
//! no interior locking.

use crate::error::{MeshError, Result};
use crate::model::{Document, Matcher, ResourceRecord};
use crate::query;
use async_trait::async_trait;
use std::collections::HashMap;

/// Per-collection persistence used by the resource handlers.
///
/// Backends (in-memory, a document database, ...) implement this trait; the
/// protocol layer only ever talks to `dyn Storage`.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Stores a new document. Fails with [`MeshError::AlreadyExists`] if the id is taken.
    async fn insert(&mut self, resource_id: &str, document: Document) -> Result<()>;

    async fn find_one(&self, resource_id: &str) -> Result<Option<Document>>;

    /// Replaces the document stored under an existing id.
    async fn save(&mut self, resource_id: &str, document: Document) -> Result<()>;

    /// Removes a document, returning whether it existed.
    async fn remove(&mut self, resource_id: &str) -> Result<bool>;

    /// Every stored document satisfying `filter` under [`query::matches`] semantics.
    async fn find(&self, filter: &Matcher) -> Result<Vec<ResourceRecord>>;

    async fn len(&self) -> usize;
}

/// Storage kept in a `HashMap` for the lifetime of the collection actor.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    documents: HashMap<String, Document>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert(&mut self, resource_id: &str, document: Document) -> Result<()> {
        if self.documents.contains_key(resource_id) {
            return Err(MeshError::AlreadyExists(resource_id.to_string()));
        }
        self.documents.insert(resource_id.to_string(), document);
        Ok(())
    }

    async fn find_one(&self, resource_id: &str) -> Result<Option<Document>> {
        Ok(self.documents.get(resource_id).cloned())
    }

    async fn save(&mut self, resource_id: &str, document: Document) -> Result<()> {
        match self.documents.get_mut(resource_id) {
            Some(slot) => {
                *slot = document;
                Ok(())
            }
            None => Err(MeshError::NotFound(resource_id.to_string())),
        }
    }

    async fn remove(&mut self, resource_id: &str) -> Result<bool> {
        Ok(self.documents.remove(resource_id).is_some())
    }

    async fn find(&self, filter: &Matcher) -> Result<Vec<ResourceRecord>> {
        Ok(self
            .documents
            .iter()
            .filter(|(_, document)| query::matches(filter, document))
            .map(|(id, document)| ResourceRecord::new(id.clone(), document.clone()))
            .collect())
    }

    async fn len(&self) -> usize {
        self.documents.len()
    }
}
