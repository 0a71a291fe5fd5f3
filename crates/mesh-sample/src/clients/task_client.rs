//! # Task Client
//!
//! A high-level API for the `tasks` collection. It wraps a [`NodeClient`], so
//! it works from any node of the cluster, whether or not that node hosts the
//! collection.

use crate::model::{Task, TaskCreate, TaskState, DEPENDS_ON, TASKS};
use resource_mesh::{Matcher, MeshError, NodeClient, ResourceApi};
use serde_json::{json, Value};
use tracing::{debug, instrument};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),
    #[error("Malformed task {id}: {reason}")]
    Malformed { id: String, reason: String },
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// Client for the `tasks` collection.
#[derive(Clone, Debug)]
pub struct TaskClient {
    inner: NodeClient,
}

impl TaskClient {
    pub fn new(inner: NodeClient) -> Self {
        Self { inner }
    }

    #[instrument(skip(self, params))]
    pub async fn create_task(&self, id: &str, params: TaskCreate) -> Result<String, TaskError> {
        debug!(title = %params.title, "Sending request");
        Ok(self.inner.create(TASKS, id, params.into_document()).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_task(&self, id: &str) -> Result<Option<Task>, TaskError> {
        match self.inner.get(TASKS, id).await? {
            Some(record) => Task::from_record(record)
                .map(Some)
                .map_err(|e| TaskError::Malformed {
                    id: id.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Marks a task done. Workers with a rule on done tasks react to it.
    #[instrument(skip(self))]
    pub async fn complete_task(&self, id: &str) -> Result<(), TaskError> {
        let patch = json!({ "$set": { "state": TaskState::Done.as_str() } });
        self.patch(id, patch).await
    }

    #[instrument(skip(self))]
    pub async fn reassign(&self, id: &str, assignee: Option<&str>) -> Result<(), TaskError> {
        let patch = match assignee {
            Some(assignee) => json!({ "$set": { "assignee": assignee } }),
            None => json!({ "$unset": { "assignee": "" } }),
        };
        self.patch(id, patch).await
    }

    /// Records that `id` depends on `dependency`.
    #[instrument(skip(self))]
    pub async fn add_dependency(&self, id: &str, dependency: &str, title: &str) -> Result<(), TaskError> {
        self.inner
            .add_link(TASKS, id, DEPENDS_ON, dependency, title)
            .await
            .map_err(|e| self.not_found_or(id, e))
    }

    /// Removes a task; `false` if it did not exist.
    #[instrument(skip(self))]
    pub async fn delete_task(&self, id: &str) -> Result<bool, TaskError> {
        Ok(self.inner.delete(TASKS, id).await?)
    }

    /// Tasks in `state`, in no particular order.
    #[instrument(skip(self))]
    pub async fn list_tasks(&self, state: TaskState) -> Result<Vec<Task>, TaskError> {
        let mut filter = Matcher::new();
        filter.insert("state".into(), Value::String(state.as_str().into()));

        self.inner
            .list(TASKS, Some(filter))
            .await?
            .into_iter()
            .map(|record| {
                let id = record.resource_id.clone();
                Task::from_record(record).map_err(|e| TaskError::Malformed {
                    id,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn patch(&self, id: &str, patch: Value) -> Result<(), TaskError> {
        self.inner
            .patch(TASKS, id, patch)
            .await
            .map(|_| ())
            .map_err(|e| self.not_found_or(id, e))
    }

    /// The owner reports a missing resource as a failed envelope; surface it as `NotFound`.
    fn not_found_or(&self, id: &str, error: MeshError) -> TaskError {
        match &error {
            MeshError::Application(message) if message.starts_with("Resource not found") => {
                TaskError::NotFound(id.to_string())
            }
            _ => TaskError::Mesh(error),
        }
    }
}
