mod common;

use common::loopback_client;
use mq_replay::admin::{start_admin_subscriptions, AdminTopics, ServiceInfo};
use mq_replay::context::ProcessContext;
use mq_replay::messaging::{handler_fn, Delivery, Message, MessageCategory, MessagingClient, Provider};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

fn service_info() -> ServiceInfo {
    ServiceInfo {
        service_name: "replay-svc".to_string(),
        version: "0.3.0".to_string(),
        maintainer: None,
        capabilities: vec!["record".to_string(), "replay".to_string()],
    }
}

async fn admin_client() -> (MessagingClient, mpsc::UnboundedReceiver<Delivery>) {
    let client = loopback_client(Provider::Kafka);
    let ctx = ProcessContext::with_instance_id("replay-svc", "instance-7");

    let (tx, rx) = mpsc::unbounded_channel();
    client
        .subscribe(
            "halo_emit",
            handler_fn(move |delivery: Delivery| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(delivery);
                }
            }),
        )
        .await
        .unwrap();

    let infos = start_admin_subscriptions(&client, ctx, &AdminTopics::default(), service_info())
        .await
        .unwrap();
    let mut topics: Vec<_> = infos.iter().map(|info| info.topic.as_str()).collect();
    topics.sort();
    assert_eq!(topics, vec!["halo", "logflush"]);

    (client, rx)
}

async fn next_reply(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Message {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap()
        .message()
        .unwrap()
}

#[tokio::test]
async fn test_halo_request_is_answered_on_halo_emit() {
    let (client, mut rx) = admin_client().await;

    let request = json!({
        "header": {
            "category": "admin_query",
            "action": "halo",
            "service_name": "console",
            "service_uuid": "console-1",
            "connection_id": "conn-42",
            "flow_id": "F-discovery",
        },
        "origin": { "from": "console", "identity": { "user_id": "u-9" } },
        "body": {},
    });
    client
        .publish_raw("halo", serde_json::to_vec(&request).unwrap())
        .await
        .unwrap();

    let reply = next_reply(&mut rx).await;
    assert_eq!(reply.header.category, MessageCategory::AdminEvent);
    assert_eq!(reply.header.action, "halo_emit");
    assert_eq!(reply.header.service_name, "replay-svc");
    assert_eq!(reply.header.service_uuid, "instance-7");
    assert_eq!(reply.header.connection_id, "conn-42");
    assert_eq!(reply.header.flow_id, "F-discovery");
    assert_eq!(reply.origin.from, "console");
    assert_eq!(
        reply.origin.identity.and_then(|identity| identity.user_id),
        Some("u-9".to_string())
    );
    assert_eq!(
        reply.body,
        json!({
            "service_name": "replay-svc",
            "version": "0.3.0",
            "maintainer": null,
            "capabilities": ["record", "replay"],
        })
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_other_actions_and_invalid_json_get_no_reply() {
    let (client, mut rx) = admin_client().await;

    client
        .publish_raw("halo", br#"{"header":{"action":"halo_emit","flow_id":"F-loop"}}"#.to_vec())
        .await
        .unwrap();
    client.publish_raw("halo", b"not json".to_vec()).await.unwrap();
    client
        .publish_raw("halo", br#"{"header":{"action":"halo","flow_id":"F-real"}}"#.to_vec())
        .await
        .unwrap();

    let reply = next_reply(&mut rx).await;
    assert_eq!(reply.header.flow_id, "F-real");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_logflush_messages_do_not_produce_replies() {
    let (client, mut rx) = admin_client().await;

    client
        .publish_raw("logflush", br#"{"body":{"message":"rotate now"}}"#.to_vec())
        .await
        .unwrap();
    client.publish_raw("logflush", b"{broken".to_vec()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(client.subscriptions().len(), 3);

    client.close().await.unwrap();
}
