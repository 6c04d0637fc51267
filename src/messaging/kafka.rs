//! Kafka broker adapter

use crate::context::ProcessContext;
use crate::messaging::config::{KafkaConfig, Provider};
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::metrics::MESSAGING_METRICS;
use crate::messaging::subscription::{Subscription, SubscriptionRegistry};
use crate::messaging::traits::{dispatch, BrokerAdapter, Delivery, MessageHandler};
use async_trait::async_trait;
use dashmap::DashMap;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::{ClientContext, DefaultClientContext};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::Message as _;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use uuid::Uuid;

/// Consumer type produced by [`KafkaAdapter::consumer`]
pub type GroupConsumer = StreamConsumer<GroupContext>;

/// Consumer-group membership of one consumer session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMembership {
    pub group_id: String,
    pub topics: Vec<String>,
    pub partitions: Vec<i32>,
}

/// Tracks partition assignment of a consumer session
pub struct GroupContext {
    key: Uuid,
    group_id: String,
    memberships: Arc<DashMap<Uuid, GroupMembership>>,
    assigned: Arc<Notify>,
}

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(assignment) => {
                let partitions: Vec<i32> = assignment
                    .elements()
                    .iter()
                    .map(|elem| elem.partition())
                    .collect();
                tracing::info!(
                    group_id = %self.group_id,
                    partitions = ?partitions,
                    "Kafka partitions assigned"
                );
                if let Some(mut membership) = self.memberships.get_mut(&self.key) {
                    membership.partitions = partitions;
                }
                self.assigned.notify_one();
            }
            Rebalance::Revoke(_) => {
                tracing::info!(group_id = %self.group_id, "Kafka partitions revoked");
                if let Some(mut membership) = self.memberships.get_mut(&self.key) {
                    membership.partitions.clear();
                }
            }
            Rebalance::Error(e) => {
                tracing::error!(group_id = %self.group_id, error = %e, "Kafka rebalance failed");
            }
        }
    }
}

impl Drop for GroupContext {
    fn drop(&mut self) {
        self.memberships.remove(&self.key);
    }
}

/// Kafka adapter: one shared producer, one consumer session per subscription
pub struct KafkaAdapter {
    config: KafkaConfig,
    ctx: Arc<ProcessContext>,
    producer: FutureProducer,
    registry: SubscriptionRegistry,
    memberships: Arc<DashMap<Uuid, GroupMembership>>,
}

impl KafkaAdapter {
    /// Create the adapter and its producer
    pub fn new(config: KafkaConfig, ctx: Arc<ProcessContext>) -> MessagingResult<Self> {
        let producer: FutureProducer = base_client_config(&config)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()
            .map_err(|e| {
                MessagingError::ConnectionFailed(format!("Kafka producer creation failed: {}", e))
            })?;

        tracing::info!(brokers = %config.bootstrap_servers(), "Kafka adapter created");

        Ok(Self {
            config,
            ctx,
            producer,
            registry: SubscriptionRegistry::new(Provider::Kafka),
            memberships: Arc::new(DashMap::new()),
        })
    }

    /// Group used when the caller does not pick one
    pub fn group_id(&self, explicit: Option<&str>) -> String {
        explicit
            .or(self.config.group_id.as_deref())
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.ctx.instance_id().to_string())
    }

    /// Create each topic unless it already exists
    pub async fn create_topics_if_not_exist(&self, topics: &[String]) -> MessagingResult<()> {
        if topics.is_empty() {
            return Ok(());
        }

        let admin: AdminClient<DefaultClientContext> =
            base_client_config(&self.config).create().map_err(|e| {
                MessagingError::ConnectionFailed(format!("Kafka admin client creation failed: {}", e))
            })?;

        let new_topics: Vec<NewTopic<'_>> = topics
            .iter()
            .map(|topic| {
                NewTopic::new(
                    topic,
                    self.config.num_partitions,
                    TopicReplication::Fixed(self.config.replication_factor),
                )
            })
            .collect();
        let options = AdminOptions::new()
            .operation_timeout(Some(Duration::from_millis(self.config.admin_timeout_ms)));

        let results = admin
            .create_topics(&new_topics, &options)
            .await
            .map_err(|e| MessagingError::TopicCreationFailed {
                topic: topics.join(","),
                reason: e.to_string(),
            })?;

        let mut failure = None;
        for result in results {
            match result {
                Ok(topic) => tracing::info!(topic = %topic, "Kafka topic created"),
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    tracing::debug!(topic = %topic, "Kafka topic already exists");
                }
                Err((topic, code)) => {
                    tracing::error!(topic = %topic, error = %code, "Kafka topic creation failed");
                    failure.get_or_insert(MessagingError::TopicCreationFailed {
                        topic,
                        reason: code.to_string(),
                    });
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Partition count of every topic in the cluster
    pub async fn list_topics(&self) -> MessagingResult<BTreeMap<String, usize>> {
        let producer = self.producer.clone();
        let timeout = Duration::from_millis(self.config.admin_timeout_ms);

        let metadata = tokio::task::spawn_blocking(move || {
            producer.client().fetch_metadata(None, timeout)
        })
        .await
        .map_err(|e| MessagingError::ConnectionFailed(format!("Kafka metadata task failed: {}", e)))?
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list Kafka topics");
            MessagingError::ConnectionFailed(format!("Kafka metadata request failed: {}", e))
        })?;

        Ok(metadata
            .topics()
            .iter()
            .filter(|topic| topic.error().is_none())
            .map(|topic| (topic.name().to_string(), topic.partitions().len()))
            .collect())
    }

    /// Whether the cluster knows the topic
    pub async fn topic_exists(&self, topic: &str) -> MessagingResult<bool> {
        Ok(self.list_topics().await?.contains_key(topic))
    }

    /// Open a consumer-group session on the topics, creating them first
    pub async fn consumer(
        &self,
        topics: &[String],
        group_id: Option<&str>,
    ) -> MessagingResult<GroupConsumer> {
        self.group_consumer(topics, &self.group_id(group_id), Uuid::new_v4(), Arc::new(Notify::new()))
            .await
    }

    /// Current group membership of every open consumer session
    pub fn memberships(&self) -> Vec<GroupMembership> {
        self.memberships
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn group_consumer(
        &self,
        topics: &[String],
        group_id: &str,
        key: Uuid,
        assigned: Arc<Notify>,
    ) -> MessagingResult<GroupConsumer> {
        self.create_topics_if_not_exist(topics).await?;

        let context = GroupContext {
            key,
            group_id: group_id.to_string(),
            memberships: Arc::clone(&self.memberships),
            assigned,
        };
        self.memberships.insert(
            key,
            GroupMembership {
                group_id: group_id.to_string(),
                topics: topics.to_vec(),
                partitions: Vec::new(),
            },
        );

        let consumer: GroupConsumer = consumer_client_config(&self.config, group_id)
            .create_with_context(context)
            .map_err(|e| {
                MessagingError::ConnectionFailed(format!("Kafka consumer creation failed: {}", e))
            })?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs).map_err(|e| {
            MessagingError::SubscribeFailed(format!("Kafka subscribe failed: {}", e))
        })?;

        tracing::info!(group_id = %group_id, topics = ?topics, "Kafka consumer session opened");
        Ok(consumer)
    }
}

#[async_trait]
impl BrokerAdapter for KafkaAdapter {
    fn provider(&self) -> Provider {
        Provider::Kafka
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> MessagingResult<()> {
        let started = Instant::now();
        let record: FutureRecord<'_, (), [u8]> = FutureRecord::to(topic).payload(&payload);

        let delivery = self.producer.send_result(record).map_err(|(e, _)| {
            MESSAGING_METRICS
                .publish_failures
                .with_label_values(&["kafka", topic])
                .inc();
            MessagingError::PublishFailed(format!("Kafka enqueue failed: {}", e))
        })?;

        let topic = topic.to_string();
        tokio::spawn(async move {
            match delivery.await {
                Ok(Ok((partition, offset))) => {
                    MESSAGING_METRICS
                        .publish_latency
                        .with_label_values(&["kafka"])
                        .observe(started.elapsed().as_secs_f64());
                    tracing::debug!(topic = %topic, partition, offset, "Kafka message delivered");
                }
                Ok(Err((e, _))) => {
                    MESSAGING_METRICS
                        .publish_failures
                        .with_label_values(&["kafka", &topic])
                        .inc();
                    tracing::error!(topic = %topic, error = %e, "Kafka delivery failed");
                }
                Err(_) => {
                    tracing::warn!(topic = %topic, "Kafka delivery report dropped");
                }
            }
        });

        Ok(())
    }

    async fn open(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> MessagingResult<Subscription> {
        let (mut subscription, mut control) =
            Subscription::new(Provider::Kafka, topic, Some(self.ctx.shutdown_signal()));

        let assigned = Arc::new(Notify::new());
        let consumer = self
            .group_consumer(
                &[topic.to_string()],
                &self.group_id(None),
                subscription.id(),
                Arc::clone(&assigned),
            )
            .await?;

        let topic = topic.to_string();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = control.cancelled() => break,
                    _ = assigned.notified() => {
                        if control.mark_active() {
                            handler.on_ready(&topic).await;
                        }
                    }
                    received = consumer.recv() => match received {
                        Ok(message) => {
                            let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
                            let mut delivery = Delivery::new(Provider::Kafka, message.topic(), payload);
                            delivery.partition = Some(message.partition());
                            delivery.offset = Some(message.offset());
                            dispatch(&handler, delivery);
                        }
                        Err(e) => {
                            MESSAGING_METRICS
                                .consume_failures
                                .with_label_values(&["kafka", &topic])
                                .inc();
                            let error = MessagingError::ConsumeFailed(e.to_string());
                            handler.on_error(&topic, &error).await;
                        }
                    }
                }
            }

            consumer.unsubscribe();
            control.mark_closed();
            tracing::info!(topic = %topic, "Kafka consumer session closed");
        });
        subscription.attach(task);

        Ok(subscription)
    }

    fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    async fn ensure_topics(&self, topics: &[String]) -> MessagingResult<()> {
        self.create_topics_if_not_exist(topics).await
    }

    async fn close(&self) -> MessagingResult<()> {
        let closed = self.registry.close_all().await;

        let producer = self.producer.clone();
        let timeout = Duration::from_millis(self.config.message_timeout_ms);
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| MessagingError::ConnectionFailed(format!("Kafka flush task failed: {}", e)))?
            .map_err(|e| MessagingError::PublishFailed(format!("Kafka flush failed: {}", e)))?;

        tracing::info!(subscriptions = closed, "Kafka adapter closed");
        Ok(())
    }
}

fn base_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", config.bootstrap_servers())
        .set("client.id", &config.client_id);

    if config.enable_sasl {
        if let (Some(mechanism), Some(username), Some(password)) = (
            &config.sasl_mechanism,
            &config.sasl_username,
            &config.sasl_password,
        ) {
            client_config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanism", mechanism)
                .set("sasl.username", username)
                .set("sasl.password", password);
        }
    }

    client_config
}

fn consumer_client_config(config: &KafkaConfig, group_id: &str) -> ClientConfig {
    let mut client_config = base_client_config(config);
    client_config
        .set("group.id", group_id)
        .set("auto.offset.reset", "latest")
        .set("partition.assignment.strategy", "roundrobin")
        .set("enable.auto.commit", "true")
        .set("session.timeout.ms", config.session_timeout_ms.to_string());
    client_config
}
