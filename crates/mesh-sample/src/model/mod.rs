pub mod task;

pub use task::{Task, TaskCreate, TaskState, DEPENDS_ON, TASKS};
