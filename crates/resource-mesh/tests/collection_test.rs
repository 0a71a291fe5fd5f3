use resource_mesh::mock::MockMedium;
use resource_mesh::publisher::EventPublisher;
use resource_mesh::{
    CollectionActor, CollectionClient, CrudMessage, Document, Inbound, MemoryStorage, MeshError,
    ResourceApi,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

const COLLECTION: &str = "Resource";

fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("test documents are objects")
}

/// A running collection whose events land in a mock medium and a loopback receiver.
fn collection() -> (CollectionClient, Arc<MockMedium>, mpsc::Receiver<Inbound>) {
    let mock = MockMedium::new();
    let (transport, _inject) = mock.transport(64);
    let publisher = EventPublisher::new(transport.medium.clone(), transport.loopback.clone());
    let (actor, client) =
        CollectionActor::new(COLLECTION, 8, Box::new(MemoryStorage::new()), publisher);
    tokio::spawn(actor.run());
    (client, mock, transport.inbound)
}

#[tokio::test]
async fn test_create_then_get_round_trips() {
    let (client, mock, mut loopback) = collection();
    let data = doc(json!({"kwarg_1": 1, "kwarg_2": 2}));

    let id = client.create(COLLECTION, "ResourceID", data.clone()).await.unwrap();
    assert_eq!(id, "ResourceID");

    let record = client.get(COLLECTION, "ResourceID").await.unwrap().unwrap();
    assert_eq!(record.resource_id, "ResourceID");
    assert_eq!(record.resource_data, data);

    // Broadcast to peers and looped back to the local node.
    let published = mock.published();
    assert_eq!(published.len(), 1);
    let (topic, event) = &published[0];
    assert_eq!(topic, "Resource.create.ResourceID");
    assert_eq!(event.resource_name, COLLECTION);
    assert_eq!(event.resource_id, "ResourceID");
    assert_eq!(event.resource_data(), Some(&data));

    match loopback.recv().await {
        Some(Inbound::Event { topic, event }) => {
            assert_eq!(topic, "Resource.create.ResourceID");
            assert_eq!(event.action, "create");
        }
        other => panic!("expected looped back event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_twice_fails_without_second_event() {
    let (client, mock, _loopback) = collection();
    client.create(COLLECTION, "r1", doc(json!({"a": 1}))).await.unwrap();

    let err = client
        .create(COLLECTION, "r1", doc(json!({"a": 2})))
        .await
        .unwrap_err();
    assert_eq!(err, MeshError::Application("Resource already exists: r1".into()));
    assert_eq!(mock.published().len(), 1);
}

#[tokio::test]
async fn test_patch_returns_merged_document_and_publishes_raw_patch() {
    let (client, mock, _loopback) = collection();
    client
        .create(COLLECTION, "r1", doc(json!({"kwarg_1": 1, "kwarg_2": 2, "old": true})))
        .await
        .unwrap();

    let patch = json!({"$set": {"kwarg_2": 3, "kwarg_3": 4}, "$unset": {"old": ""}});
    let merged = client.patch(COLLECTION, "r1", patch.clone()).await.unwrap();
    let expected = doc(json!({"kwarg_1": 1, "kwarg_2": 3, "kwarg_3": 4}));
    assert_eq!(merged, expected);

    let record = client.get(COLLECTION, "r1").await.unwrap().unwrap();
    assert_eq!(record.resource_data, expected);

    let (topic, event) = mock.published().pop().unwrap();
    assert_eq!(topic, "Resource.patch.r1");
    assert_eq!(event.payload.get("patch"), Some(&patch));
    assert!(event.resource_data().is_none());
}

#[tokio::test]
async fn test_patch_with_unknown_operator_is_rejected() {
    let (client, _mock, _loopback) = collection();
    client.create(COLLECTION, "r1", doc(json!({"a": 1}))).await.unwrap();

    let err = client
        .patch(COLLECTION, "r1", json!({"$inc": {"a": 1}}))
        .await
        .unwrap_err();
    assert!(matches!(err, MeshError::Application(ref m) if m.starts_with("Invalid parameters for patch")));

    let record = client.get(COLLECTION, "r1").await.unwrap().unwrap();
    assert_eq!(record.resource_data, doc(json!({"a": 1})));
}

#[tokio::test]
async fn test_delete_then_get_reports_not_found() {
    let (client, mock, _loopback) = collection();
    client.create(COLLECTION, "r1", doc(json!({"a": 1}))).await.unwrap();

    assert!(client.delete(COLLECTION, "r1").await.unwrap());
    assert_eq!(client.get(COLLECTION, "r1").await.unwrap(), None);

    // Raw wire answer is the not-found marker, not a failure.
    let raw = client
        .call(CrudMessage::new(COLLECTION, "get").with_id("r1"))
        .await;
    assert!(raw.success);
    assert_eq!(raw.data, json!("NOK"));

    // Deleting again is a no-op that reports absence and publishes nothing.
    assert!(!client.delete(COLLECTION, "r1").await.unwrap());
    let actions: Vec<String> = mock.published().into_iter().map(|(_, e)| e.action).collect();
    assert_eq!(actions, vec!["create", "delete"]);

    let (_, delete_event) = mock.published().pop().unwrap();
    assert!(delete_event.payload.is_empty());
}

#[tokio::test]
async fn test_add_link_appends_in_call_order() {
    let (client, mock, _loopback) = collection();
    client.create(COLLECTION, "r1", doc(json!({"a": 1}))).await.unwrap();

    client
        .add_link(COLLECTION, "r1", "relation", "target_1", "title_1")
        .await
        .unwrap();
    client
        .add_link(COLLECTION, "r1", "relation", "target_2", "title_2")
        .await
        .unwrap();

    let record = client.get(COLLECTION, "r1").await.unwrap().unwrap();
    let targets: Vec<String> = record
        .links("relation")
        .into_iter()
        .map(|link| link.target_id)
        .collect();
    assert_eq!(targets, vec!["target_1", "target_2"]);
    assert_eq!(record.resource_data.get("a"), Some(&json!(1)));

    let (topic, event) = mock.published().pop().unwrap();
    assert_eq!(topic, "Resource.add_link.r1");
    assert_eq!(event.payload.get("target_id"), Some(&json!("target_2")));
    assert_eq!(event.payload.get("title"), Some(&json!("title_2")));
}

#[tokio::test]
async fn test_add_link_on_missing_resource_fails() {
    let (client, mock, _loopback) = collection();
    let err = client
        .add_link(COLLECTION, "ghost", "relation", "t", "t")
        .await
        .unwrap_err();
    assert_eq!(err, MeshError::Application("Resource not found: ghost".into()));
    assert!(mock.published().is_empty());
}

#[tokio::test]
async fn test_list_with_and_without_filter() {
    let (client, _mock, _loopback) = collection();
    client.create(COLLECTION, "UUID1", doc(json!({"field1": 1, "field2": 2}))).await.unwrap();
    client.create(COLLECTION, "UUID2", doc(json!({"field1": 3, "field2": 2}))).await.unwrap();
    client.create(COLLECTION, "UUID3", doc(json!({"field1": 1, "field2": 3}))).await.unwrap();

    let all: HashSet<String> = client
        .list(COLLECTION, None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.resource_id)
        .collect();
    assert_eq!(all, HashSet::from(["UUID1".into(), "UUID2".into(), "UUID3".into()]));

    let ones: HashSet<String> = client
        .list(COLLECTION, Some(doc(json!({"field1": 1}))))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.resource_id)
        .collect();
    assert_eq!(ones, HashSet::from(["UUID1".into(), "UUID3".into()]));

    let none = client
        .list(COLLECTION, Some(doc(json!({"missing": 1}))))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_actions_outside_the_tables_fail_as_envelopes() {
    let (client, _mock, _loopback) = collection();

    // Resource action without an id, collection action with one, unknown action.
    for message in [
        CrudMessage::new(COLLECTION, "get"),
        CrudMessage::new(COLLECTION, "list").with_id("r1"),
        CrudMessage::new(COLLECTION, "drop_everything").with_id("r1"),
    ] {
        let action = message.action.clone();
        let envelope = client.call(message).await;
        assert!(!envelope.success);
        assert_eq!(envelope.data, json!(format!("No handler for action {action}")));
    }

    // The collection keeps serving after failures.
    assert!(client.list(COLLECTION, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_params_fail_as_envelopes() {
    let (client, _mock, _loopback) = collection();
    let envelope = client
        .call(CrudMessage::new(COLLECTION, "create").with_id("r1"))
        .await;
    assert!(!envelope.success);
    assert!(envelope.data.as_str().unwrap().starts_with("Invalid parameters for create"));
}

#[tokio::test]
async fn test_collection_client_rejects_other_collections() {
    let (client, _mock, _loopback) = collection();
    let err = client.get("Other", "r1").await.unwrap_err();
    assert_eq!(err, MeshError::NoCollection("Other".into()));
}
