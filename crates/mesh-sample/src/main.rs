//! # Mesh Sample
//!
//! Runs a two-node task cluster in one process:
//! 1. Starts the [`ClusterSystem`] (a host owning `tasks` and a notifier worker).
//! 2. Creates tasks through the worker, which routes them to the host.
//! 3. Completes one, lets the notifier react, and reconciles once more.
//!
//! Settings come from `NodeConfig::load`: the file named by `MESH_CONFIG`, if
//! set, and `MESH__*` environment variables (e.g. `MESH__POLL_INTERVAL=2s`).

use mesh_sample::lifecycle::ClusterSystem;
use mesh_sample::model::{TaskCreate, TaskState};
use resource_mesh::tracing::setup_tracing;
use resource_mesh::NodeConfig;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config_file = std::env::var("MESH_CONFIG").ok();
    let config = NodeConfig::load(config_file.as_deref()).map_err(|e| e.to_string())?;
    info!(?config, "Starting task cluster");

    let system = ClusterSystem::new(config).await?;

    let span = tracing::info_span!("task_creation");
    async {
        for (id, title) in [("t1", "Write the report"), ("t2", "Review the report")] {
            let params = TaskCreate::new(title).assigned_to("ada");
            let created = system
                .task_client
                .create_task(id, params)
                .await
                .map_err(|e| e.to_string())?;
            info!(task = %created, "Task created");
        }
        system
            .task_client
            .add_dependency("t2", "t1", "Write the report")
            .await
            .map_err(|e| e.to_string())
    }
    .instrument(span)
    .await?;

    let span = tracing::info_span!("task_completion");
    let outcome = async {
        system.task_client.complete_task("t1").await?;
        let report = system.notifier.poll_check().await?;
        info!(hits = report.hits, failures = report.failures, "Reconciled");
        system.task_client.list_tasks(TaskState::Open).await
    }
    .instrument(span)
    .await;

    match outcome {
        Ok(open) => info!(open = open.len(), completed = ?system.completions.completed(), "Done"),
        Err(e) => error!(error = %e, "Task flow failed"),
    }

    system.shutdown().await?;
    info!("Application completed successfully");
    Ok(())
}
