pub mod task_client;

pub use task_client::{TaskClient, TaskError};
