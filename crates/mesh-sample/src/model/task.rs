//! A unit of work stored in the `tasks` collection.
//!
//! Tasks travel through the mesh as plain documents; [`Task`] is the typed
//! view the sample works with on either side of the wire.

use resource_mesh::{Document, ResourceRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the collection tasks live in.
pub const TASKS: &str = "tasks";

/// Relation tasks use to point at the tasks they depend on.
pub const DEPENDS_ON: &str = "depends_on";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Open,
    Done,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Open => "open",
            TaskState::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(skip)]
    pub id: String,
    pub title: String,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

impl Task {
    /// Decodes a stored record. Extra fields such as `_links` are ignored.
    pub fn from_record(record: ResourceRecord) -> Result<Self, serde_json::Error> {
        let mut task: Task = serde_json::from_value(Value::Object(record.resource_data))?;
        task.id = record.resource_id;
        Ok(task)
    }
}

/// DTO for task creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreate {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

impl TaskCreate {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            assignee: None,
        }
    }

    pub fn assigned_to(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// The document stored for a new task: always starts open.
    pub fn into_document(self) -> Document {
        let mut document = Document::new();
        document.insert("title".into(), Value::String(self.title));
        document.insert("state".into(), Value::String(TaskState::Open.as_str().into()));
        if let Some(assignee) = self.assignee {
            document.insert("assignee".into(), Value::String(assignee));
        }
        document
    }
}
