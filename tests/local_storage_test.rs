mod common;

use common::{eventually, loopback_client, sample_message};
use mq_replay::catalog::StaticKv;
use mq_replay::context::ProcessContext;
use mq_replay::messaging::{
    Header, Message, MessageCategory, MessagingClient, MessagingSettings, Provider,
    ProviderSelection, SubscriptionState,
};
use mq_replay::replay::{start_local_storage, LocalStorage, ReplayError, ReplayStore};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    kafka: MessagingClient,
    nats: MessagingClient,
    storage: LocalStorage,
}

async fn harness(topics: &[&str]) -> Harness {
    let dir = TempDir::new().unwrap();
    let kafka = loopback_client(Provider::Kafka);
    let nats = loopback_client(Provider::Nats);

    let storage = LocalStorage::start_with(
        ReplayStore::new(dir.path()),
        topics.iter().map(|t| t.to_string()).collect(),
        vec![kafka.clone(), nats.clone()],
    )
    .await
    .unwrap();

    Harness {
        _dir: dir,
        kafka,
        nats,
        storage,
    }
}

async fn stored(storage: &LocalStorage, topic: &str, flow_id: &str, provider: Provider) -> Vec<Value> {
    storage.messages(topic, flow_id, provider).await.unwrap()
}

async fn wait_for_count(storage: &LocalStorage, topic: &str, flow_id: &str, provider: Provider, n: usize) -> bool {
    eventually(|| {
        let storage = storage;
        async move { stored(storage, topic, flow_id, provider).await.len() == n }
    })
    .await
}

/// Publish F1 on t1 over Kafka; it is stored under Kafka only
#[tokio::test]
async fn test_flow_stored_under_publishing_provider() {
    let h = harness(&["t1"]).await;

    let message = Message::new(Header::new(
        MessageCategory::BusinessEvent,
        "x_set",
        "tests",
        "svc",
        "conn",
        "F1",
    ))
    .with_body(json!({ "x": 1 }));
    h.kafka.publish("t1", &message).await.unwrap();

    assert!(wait_for_count(&h.storage, "t1", "F1", Provider::Kafka, 1).await);
    let stored_f1 = stored(&h.storage, "t1", "F1", Provider::Kafka).await;
    assert_eq!(stored_f1, vec![serde_json::to_value(&message).unwrap()]);
    assert_eq!(serde_json::from_value::<Message>(stored_f1[0].clone()).unwrap(), message);
    assert!(stored(&h.storage, "t1", "F1", Provider::Nats).await.is_empty());
}

/// Messages of different flows never mix
#[tokio::test]
async fn test_flow_isolation() {
    let h = harness(&["orders"]).await;

    for n in 0..3 {
        h.nats.publish("orders", &sample_message("A", n)).await.unwrap();
    }
    h.nats.publish("orders", &sample_message("B", 10)).await.unwrap();

    assert!(wait_for_count(&h.storage, "orders", "A", Provider::Nats, 3).await);
    assert!(wait_for_count(&h.storage, "orders", "B", Provider::Nats, 1).await);

    let a = stored(&h.storage, "orders", "A", Provider::Nats).await;
    assert!(a.iter().all(|m| m["header"]["flow_id"] == "A"));
    let mut ns: Vec<i64> = a.iter().map(|m| m["body"]["n"].as_i64().unwrap()).collect();
    ns.sort();
    assert_eq!(ns, vec![0, 1, 2]);

    assert_eq!(
        h.storage.flows(Provider::Nats, "orders").await.unwrap(),
        vec!["A", "B"]
    );
}

/// Both providers recorded side by side stay in their own namespace
#[tokio::test]
async fn test_provider_isolation() {
    let h = harness(&["shared"]).await;

    h.kafka.publish("shared", &sample_message("K", 1)).await.unwrap();
    h.nats.publish("shared", &sample_message("N", 2)).await.unwrap();

    assert!(wait_for_count(&h.storage, "shared", "K", Provider::Kafka, 1).await);
    assert!(wait_for_count(&h.storage, "shared", "N", Provider::Nats, 1).await);
    assert!(stored(&h.storage, "shared", "K", Provider::Nats).await.is_empty());
    assert!(stored(&h.storage, "shared", "N", Provider::Kafka).await.is_empty());
}

/// Unsubscribing one topic leaves its siblings recording
#[tokio::test]
async fn test_partial_unsubscribe() {
    let h = harness(&["a", "b"]).await;

    assert_eq!(h.storage.unsubscribe(&["a".to_string()]).await, 2);
    let states = h.storage.topic_states();
    assert!(states
        .iter()
        .filter(|s| s.topic == "a")
        .all(|s| s.state == SubscriptionState::Closed));
    assert!(states
        .iter()
        .filter(|s| s.topic == "b")
        .all(|s| s.state == SubscriptionState::Active));

    h.kafka.publish("a", &sample_message("F", 1)).await.unwrap();
    h.kafka.publish("b", &sample_message("F", 2)).await.unwrap();

    assert!(wait_for_count(&h.storage, "b", "F", Provider::Kafka, 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(stored(&h.storage, "a", "F", Provider::Kafka).await.is_empty());
}

/// Payloads that are not message envelopes are dropped; recording continues
#[tokio::test]
async fn test_malformed_payload_dropped() {
    let h = harness(&["t"]).await;

    h.kafka.publish_raw("t", b"not json".to_vec()).await.unwrap();
    h.kafka
        .publish_raw("t", br#"{"body":{"no":"header"}}"#.to_vec())
        .await
        .unwrap();
    h.kafka.publish("t", &sample_message("F", 1)).await.unwrap();

    assert!(wait_for_count(&h.storage, "t", "F", Provider::Kafka, 1).await);
    assert_eq!(
        h.storage.flows(Provider::Kafka, "t").await.unwrap(),
        vec!["F"]
    );
}

/// Envelopes are stored as received, including fields the typed model lacks
#[tokio::test]
async fn test_envelope_stored_verbatim() {
    let h = harness(&["raw"]).await;
    let envelope = json!({
        "header": {
            "category": "business_event",
            "action": "x_set",
            "message_uuid": "m-1",
            "service_name": "legacy",
            "connection_id": "c-1",
            "flow_id": "F2",
            "trace_id": "t-9",
        },
        "origin": { "from": "x", "extra": { "hop": 2 } },
        "body": { "x": 1 },
    });

    h.kafka
        .publish_raw("raw", serde_json::to_vec(&envelope).unwrap())
        .await
        .unwrap();

    assert!(wait_for_count(&h.storage, "raw", "F2", Provider::Kafka, 1).await);
    let stored = stored(&h.storage, "raw", "F2", Provider::Kafka).await;
    assert_eq!(stored, vec![envelope]);
    assert_eq!(stored[0]["header"]["trace_id"], "t-9");
    assert!(stored[0]["header"].get("service_uuid").is_none());
}

/// Messages without a flow id are kept under the empty flow
#[tokio::test]
async fn test_empty_flow_id_is_recorded() {
    let h = harness(&["t"]).await;

    h.nats.publish("t", &sample_message("", 1)).await.unwrap();
    h.nats
        .publish_raw("t", br#"{"header":{"action":"ping"},"body":{}}"#.to_vec())
        .await
        .unwrap();

    assert!(wait_for_count(&h.storage, "t", "", Provider::Nats, 2).await);
    assert_eq!(h.storage.flows(Provider::Nats, "t").await.unwrap(), vec![""]);
}

/// A burst of messages on one flow loses nothing
#[tokio::test]
async fn test_concurrent_appends_all_persisted() {
    let h = harness(&["burst"]).await;

    for n in 0..50 {
        h.nats.publish("burst", &sample_message("F", n)).await.unwrap();
    }

    assert!(wait_for_count(&h.storage, "burst", "F", Provider::Nats, 50).await);
}

/// Querying a provider the recorder is not attached to is an error
#[tokio::test]
async fn test_unrecorded_provider_is_rejected() {
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::start_with(
        ReplayStore::new(dir.path()),
        vec!["t".to_string()],
        vec![loopback_client(Provider::Kafka)],
    )
    .await
    .unwrap();

    assert!(storage.messages("t", "F", Provider::Kafka).await.unwrap().is_empty());
    let err = storage.messages("t", "F", Provider::Nats).await.unwrap_err();
    assert!(matches!(err, ReplayError::ProviderNotRecorded(Provider::Nats)));
}

/// Stop closes every recorder subscription
#[tokio::test]
async fn test_stop_closes_subscriptions() {
    let h = harness(&["a", "b"]).await;
    assert_eq!(h.kafka.subscriptions().len(), 2);

    h.storage.stop().await.unwrap();
    assert!(h.kafka.subscriptions().is_empty());
    assert!(h
        .storage
        .topic_states()
        .iter()
        .all(|s| s.state == SubscriptionState::Closed));
}

/// The factory resolves topics from the catalog; disabled NATS still subscribes
#[tokio::test]
async fn test_start_from_catalog_with_disabled_nats() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("topics.yaml");
    std::fs::write(
        &catalog,
        r#"
kafka:
  topicsGroups:
    - path: app/topics
      topics:
        - name: results
          default_value: results.v1
        - name: other
          default_value: other.v1
"#,
    )
    .unwrap();

    let kv = StaticKv::new([("app/topics/results", "results.v2")]);
    let storage = start_local_storage(
        &catalog,
        ProviderSelection::Nats,
        &MessagingSettings::default(),
        &kv,
        ProcessContext::new("tests"),
        dir.path().join("store"),
    )
    .await
    .unwrap();

    assert_eq!(storage.topics(), ["results.v2", "other.v1"]);
    assert_eq!(storage.providers(), vec![Provider::Nats]);
    assert!(storage
        .topic_states()
        .iter()
        .all(|s| s.state == SubscriptionState::Active));
    storage.stop().await.unwrap();
}
