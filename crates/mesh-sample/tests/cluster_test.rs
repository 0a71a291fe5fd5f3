use mesh_sample::clients::{TaskClient, TaskError};
use mesh_sample::lifecycle::ClusterSystem;
use mesh_sample::model::{TaskCreate, TaskState, DEPENDS_ON, TASKS};
use resource_mesh::mock::MockMedium;
use resource_mesh::{
    Envelope, Inbound, MeshError, NodeActor, NodeConfig, NodeId, NodeInfo, NodeKind, ResourceApi,
};
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

fn config() -> NodeConfig {
    NodeConfig::default()
        .with_poll_interval(Duration::from_secs(3600))
        .with_request_timeout(Duration::from_millis(500))
}

async fn wait_for_completions(system: &ClusterSystem, expected: &[&str]) {
    let expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    for _ in 0..100 {
        if system.completions.completed() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "completions {:?} never reached {:?}",
        system.completions.completed(),
        expected
    );
}

/// Full end-to-end flow through both nodes.
#[tokio::test]
async fn test_full_task_flow_across_the_cluster() {
    let system = ClusterSystem::new(config()).await.expect("cluster starts");

    // Created through the worker, stored on the host.
    let id = system
        .task_client
        .create_task("t1", TaskCreate::new("Write the report").assigned_to("ada"))
        .await
        .expect("Failed to create task");
    assert_eq!(id, "t1");
    system
        .task_client
        .create_task("t2", TaskCreate::new("Review the report"))
        .await
        .unwrap();

    let stored = system
        .host_task_client
        .get_task("t1")
        .await
        .unwrap()
        .expect("Task not found on host");
    assert_eq!(stored.title, "Write the report");
    assert_eq!(stored.state, TaskState::Open);
    assert_eq!(stored.assignee.as_deref(), Some("ada"));

    system
        .task_client
        .add_dependency("t2", "t1", "Write the report")
        .await
        .unwrap();
    let record = system.host.get(TASKS, "t2").await.unwrap().unwrap();
    let links = record.links(DEPENDS_ON);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].target_id, "t1");

    // Completing a task reaches the notifier through events.
    system.task_client.complete_task("t1").await.unwrap();
    wait_for_completions(&system, &["t1"]).await;

    let open: HashSet<String> = system
        .task_client
        .list_tasks(TaskState::Open)
        .await
        .unwrap()
        .into_iter()
        .map(|task| task.id)
        .collect();
    assert_eq!(open, HashSet::from(["t2".to_string()]));

    system.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn test_reconciliation_catches_completions_without_events() {
    let system = ClusterSystem::new(config()).await.unwrap();

    // Created on the host while open, so only the completion matches.
    system
        .host_task_client
        .create_task("t9", TaskCreate::new("Quiet one"))
        .await
        .unwrap();
    system.task_client.complete_task("t9").await.unwrap();
    wait_for_completions(&system, &["t9"]).await;

    // A sweep reports the same task again; the log stays deduplicated.
    let report = system.notifier.poll_check().await.unwrap();
    assert_eq!((report.rules, report.hits, report.failures), (1, 1, 0));
    assert_eq!(system.completions.completed(), vec!["t9".to_string()]);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_tasks() {
    let system = ClusterSystem::new(config()).await.unwrap();

    assert!(system.task_client.get_task("ghost").await.unwrap().is_none());
    assert!(matches!(
        system.task_client.complete_task("ghost").await,
        Err(TaskError::NotFound(id)) if id == "ghost"
    ));
    assert!(matches!(
        system.task_client.add_dependency("ghost", "t1", "x").await,
        Err(TaskError::NotFound(_))
    ));
    assert!(!system.task_client.delete_task("ghost").await.unwrap());

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reassign_sets_and_clears() {
    let system = ClusterSystem::new(config()).await.unwrap();
    let tasks = &system.task_client;

    tasks.create_task("t1", TaskCreate::new("x")).await.unwrap();
    tasks.reassign("t1", Some("grace")).await.unwrap();
    assert_eq!(
        tasks.get_task("t1").await.unwrap().unwrap().assignee.as_deref(),
        Some("grace")
    );
    tasks.reassign("t1", None).await.unwrap();
    assert_eq!(tasks.get_task("t1").await.unwrap().unwrap().assignee, None);

    assert!(tasks.delete_task("t1").await.unwrap());
    assert!(tasks.get_task("t1").await.unwrap().is_none());

    system.shutdown().await.unwrap();
}

/// Client-level error mapping against a scripted owner.
#[tokio::test]
async fn test_transport_errors_pass_through_task_client() {
    let mock = MockMedium::new();
    let (transport, inject) = mock.transport(16);
    let (node, client) = NodeActor::worker("client-only", config(), transport);
    let mut joins = node.peer_joins();
    tokio::spawn(node.run());

    inject
        .send(Inbound::Registration(NodeInfo {
            node_id: NodeId::from("owner"),
            name: "owner".into(),
            resources: vec![TASKS.into()],
            node_type: NodeKind::Node,
        }))
        .await
        .unwrap();
    joins.recv().await.unwrap();

    let tasks = TaskClient::new(client);

    mock.expect_send().hang();
    let err = tasks.get_task("t1").await.unwrap_err();
    assert!(matches!(err, TaskError::Mesh(MeshError::Timeout { .. })));

    mock.expect_send()
        .return_ok(Envelope::ok(json!({"resource_id": "t1", "resource_data": {"title": 7}})));
    let err = tasks.get_task("t1").await.unwrap_err();
    assert!(matches!(err, TaskError::Malformed { ref id, .. } if id == "t1"));

    mock.expect_send()
        .return_ok(Envelope::failure("Invalid parameters for patch: boom"));
    let err = tasks.complete_task("t1").await.unwrap_err();
    assert!(matches!(err, TaskError::Mesh(MeshError::Application(_))));
    mock.verify();
}
