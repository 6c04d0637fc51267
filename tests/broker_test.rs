//! Tests against live brokers
//!
//! Run with `cargo test -- --ignored` and `KAFKA_BROKERS` / `NATS_SERVER` set.

use mq_replay::context::ProcessContext;
use mq_replay::messaging::{
    KafkaAdapter, KafkaConfig, MessagingClient, MessagingOptions, NatsConfig, get_client,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn kafka_config() -> KafkaConfig {
    KafkaConfig {
        brokers: std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
#[ignore = "requires a Kafka broker"]
async fn test_kafka_topic_creation_is_idempotent() {
    let adapter = KafkaAdapter::new(kafka_config(), ProcessContext::new("broker-tests")).unwrap();
    let topic = format!("mq-replay-test-{}", Uuid::new_v4());
    let topics = vec![topic.clone(), topic.clone()];

    adapter.create_topics_if_not_exist(&topics).await.unwrap();
    adapter.create_topics_if_not_exist(&topics).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a Kafka broker"]
async fn test_kafka_list_topics_and_exists() {
    let config = KafkaConfig {
        num_partitions: 2,
        ..kafka_config()
    };
    let adapter = KafkaAdapter::new(config, ProcessContext::new("broker-tests")).unwrap();
    let topic = format!("mq-replay-test-{}", Uuid::new_v4());

    assert!(!adapter.topic_exists(&topic).await.unwrap());
    adapter.create_topics_if_not_exist(&[topic.clone()]).await.unwrap();

    let topics = adapter.list_topics().await.unwrap();
    assert_eq!(topics.get(&topic), Some(&2));
    assert!(adapter.topic_exists(&topic).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a Kafka broker"]
async fn test_kafka_last_message() {
    let ctx = ProcessContext::new("broker-tests");
    let client = get_client(MessagingOptions::Kafka(kafka_config()), Arc::clone(&ctx))
        .await
        .unwrap();
    let topic = format!("mq-replay-test-{}", Uuid::new_v4());
    client.ensure_topics(vec![topic.clone()]).await.unwrap();

    let waiter = {
        let client = client.clone();
        let topic = topic.clone();
        tokio::spawn(async move { client.last_message(&topic).await })
    };
    let delivery = publish_until_resolved(&client, &topic, waiter).await;
    assert_eq!(delivery, "ping");
    client.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a NATS server"]
async fn test_nats_last_message() {
    let config = NatsConfig {
        enabled: true,
        server: std::env::var("NATS_SERVER").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
        ..Default::default()
    };
    let client = get_client(MessagingOptions::Nats(config), ProcessContext::new("broker-tests"))
        .await
        .unwrap();
    let topic = format!("mq-replay.test.{}", Uuid::new_v4());

    let waiter = {
        let client = client.clone();
        let topic = topic.clone();
        tokio::spawn(async move { client.last_message(&topic).await })
    };
    let delivery = publish_until_resolved(&client, &topic, waiter).await;
    assert_eq!(delivery, "ping");
    client.close().await.unwrap();
}

async fn publish_until_resolved(
    client: &MessagingClient,
    topic: &str,
    waiter: tokio::task::JoinHandle<mq_replay::messaging::MessagingResult<mq_replay::messaging::Delivery>>,
) -> String {
    for _ in 0..150 {
        client.publish_raw(topic, b"ping".to_vec()).await.unwrap();
        if waiter.is_finished() {
            return waiter.await.unwrap().unwrap().payload_str().into_owned();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    panic!("no message on {topic}");
}
