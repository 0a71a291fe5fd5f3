use resource_mesh::{
    Document, MemoryNetwork, MemoryStorage, MeshError, NodeActor, NodeClient, NodeConfig, NodeInfo,
    ResourceApi, RuleHit, PERIODIC,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("test documents are objects")
}

fn config() -> NodeConfig {
    // Long poll interval: reconciliation only runs when a test asks for it.
    NodeConfig::default()
        .with_poll_interval(Duration::from_secs(3600))
        .with_request_timeout(Duration::from_millis(500))
}

async fn joined(joins: &mut broadcast::Receiver<NodeInfo>, peers: usize) {
    for _ in 0..peers {
        timeout(Duration::from_secs(2), joins.recv())
            .await
            .expect("peer did not join in time")
            .expect("join stream closed");
    }
}

async fn host(network: &MemoryNetwork, name: &str, collections: &[&str]) -> (NodeClient, broadcast::Receiver<NodeInfo>) {
    let (mut node, client) = NodeActor::host(name, config(), network.attach(64).await);
    for collection in collections {
        node.register_collection(*collection, MemoryStorage::new()).unwrap();
    }
    let joins = node.peer_joins();
    tokio::spawn(node.run());
    (client, joins)
}

async fn worker(
    network: &MemoryNetwork,
    resource_type: &str,
    matcher: Value,
) -> (NodeClient, broadcast::Receiver<NodeInfo>, mpsc::UnboundedReceiver<RuleHit>) {
    let (mut node, client) = NodeActor::worker("reactor", config(), network.attach(64).await);
    let (tx, rx) = mpsc::unbounded_channel();
    node.register_rule(resource_type, doc(matcher), move |hit: RuleHit| {
        let _ = tx.send(hit);
    });
    let joins = node.peer_joins();
    tokio::spawn(node.run());
    (client, joins, rx)
}

async fn next_hit(hits: &mut mpsc::UnboundedReceiver<RuleHit>) -> RuleHit {
    timeout(Duration::from_secs(2), hits.recv())
        .await
        .expect("rule did not fire in time")
        .expect("recorder closed")
}

#[tokio::test]
async fn test_messages_route_to_the_owning_node() {
    let network = MemoryNetwork::new();
    let (tasks_host, mut tasks_joins) = host(&network, "tasks-host", &["tasks"]).await;
    let (users_host, mut users_joins) = host(&network, "users-host", &["users"]).await;
    joined(&mut tasks_joins, 1).await;
    joined(&mut users_joins, 1).await;

    // Created through the users host, stored on the tasks host.
    users_host
        .create("tasks", "t1", doc(json!({"title": "route me"})))
        .await
        .unwrap();
    let record = tasks_host.get("tasks", "t1").await.unwrap().unwrap();
    assert_eq!(record.resource_data, doc(json!({"title": "route me"})));

    tasks_host
        .create("users", "u1", doc(json!({"name": "ada"})))
        .await
        .unwrap();
    assert!(users_host.get("users", "u1").await.unwrap().is_some());

    // Remote handler failures come back as application errors.
    let err = users_host
        .patch("tasks", "missing", json!({"$set": {"a": 1}}))
        .await
        .unwrap_err();
    assert_eq!(err, MeshError::Application("Resource not found: missing".into()));

    let directory = users_host.resource_directory().await.unwrap();
    let tasks_id = tasks_host.info().await.unwrap().node_id;
    assert_eq!(directory.get("tasks"), Some(&tasks_id));
}

#[tokio::test]
async fn test_worker_reacts_to_remote_events() {
    let network = MemoryNetwork::new();
    let (tasks_host, mut host_joins) = host(&network, "tasks-host", &["tasks"]).await;
    let (_worker, mut worker_joins, mut hits) = worker(&network, "tasks", json!({"state": "done"})).await;
    joined(&mut host_joins, 1).await;
    joined(&mut worker_joins, 1).await;

    tasks_host
        .create("tasks", "t1", doc(json!({"state": "open", "title": "a"})))
        .await
        .unwrap();
    tasks_host
        .create("tasks", "t2", doc(json!({"state": "done", "title": "b"})))
        .await
        .unwrap();
    let hit = next_hit(&mut hits).await;
    assert_eq!((hit.resource_id.as_str(), hit.action.as_str()), ("t2", "create"));

    // Patch events are thin; the worker fetches the document from the owner.
    tasks_host
        .patch("tasks", "t1", json!({"$set": {"state": "done"}}))
        .await
        .unwrap();
    let hit = next_hit(&mut hits).await;
    assert_eq!((hit.resource_id.as_str(), hit.action.as_str()), ("t1", "patch"));
    assert_eq!(
        hit.resource_data,
        Some(doc(json!({"state": "done", "title": "a"})))
    );
}

#[tokio::test]
async fn test_host_tracks_workers_by_unique_name() {
    let network = MemoryNetwork::new();
    let (tasks_host, mut host_joins) = host(&network, "tasks-host", &["tasks"]).await;
    let (first, _, _first_hits) = worker(&network, "tasks", json!({})).await;
    let (second, _, _second_hits) = worker(&network, "tasks", json!({})).await;
    joined(&mut host_joins, 2).await;

    let first_name = first.info().await.unwrap().name;
    let second_name = second.info().await.unwrap().name;
    assert_ne!(first_name, second_name);
    assert!(first_name.starts_with("reactor-"));

    let mut expected = vec![first_name, second_name];
    expected.sort();
    let known = tasks_host.known_workers().await.unwrap();
    assert_eq!(known.get("tasks"), Some(&expected));
}

#[tokio::test]
async fn test_reconciliation_finds_resources_created_before_the_worker() {
    let network = MemoryNetwork::new();
    let (tasks_host, _host_joins) = host(&network, "tasks-host", &["tasks"]).await;
    tasks_host
        .create("tasks", "early", doc(json!({"state": "open"})))
        .await
        .unwrap();
    tasks_host
        .create("tasks", "closed", doc(json!({"state": "closed"})))
        .await
        .unwrap();

    let (worker_client, mut worker_joins, mut hits) =
        worker(&network, "tasks", json!({"state": "open"})).await;
    joined(&mut worker_joins, 1).await;

    let report = worker_client.poll_check().await.unwrap();
    assert_eq!((report.rules, report.hits, report.failures), (1, 1, 0));
    let hit = next_hit(&mut hits).await;
    assert_eq!(hit.resource_id, "early");
    assert_eq!(hit.action, PERIODIC);
}

#[tokio::test]
async fn test_polling_and_events_select_the_same_resources() {
    let network = MemoryNetwork::new();
    let (tasks_host, mut host_joins) = host(&network, "tasks-host", &["tasks"]).await;
    let (worker_client, mut worker_joins, mut hits) =
        worker(&network, "tasks", json!({"field1": 1})).await;
    joined(&mut host_joins, 1).await;
    joined(&mut worker_joins, 1).await;

    for (id, field1) in [("UUID1", 1), ("UUID2", 3), ("UUID3", 1)] {
        tasks_host
            .create("tasks", id, doc(json!({"field1": field1, "field2": 2})))
            .await
            .unwrap();
    }

    let mut from_events = HashSet::new();
    while from_events.len() < 2 {
        let hit = next_hit(&mut hits).await;
        assert_eq!(hit.action, "create");
        from_events.insert(hit.resource_id);
    }

    let report = worker_client.poll_check().await.unwrap();
    assert_eq!(report.hits, 2);
    let mut from_poll = HashSet::new();
    while from_poll.len() < 2 {
        let hit = next_hit(&mut hits).await;
        assert_eq!(hit.action, PERIODIC);
        from_poll.insert(hit.resource_id);
    }

    assert_eq!(from_events, from_poll);
    assert_eq!(from_poll, HashSet::from(["UUID1".to_string(), "UUID3".to_string()]));
}

#[tokio::test]
async fn test_departed_owner_is_unavailable() {
    let network = MemoryNetwork::new();
    let (tasks_host, mut tasks_joins) = host(&network, "tasks-host", &["tasks"]).await;
    let (other, mut other_joins) = host(&network, "other", &["users"]).await;
    joined(&mut tasks_joins, 1).await;
    joined(&mut other_joins, 1).await;

    tasks_host.shutdown().await.unwrap();

    let err = other.list("tasks", None).await.unwrap_err();
    assert!(err.is_transport(), "unexpected error {err:?}");
    assert!(matches!(err, MeshError::Unavailable { .. }));
    assert_eq!(network.node_ids().await.len(), 1);
}
