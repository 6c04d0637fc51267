//! Provider-agnostic messaging client

use crate::context::ProcessContext;
use crate::messaging::config::{MessagingOptions, Provider};
use crate::messaging::error::MessagingResult;
use crate::messaging::kafka::KafkaAdapter;
use crate::messaging::message::Message;
use crate::messaging::metrics::MESSAGING_METRICS;
use crate::messaging::nats::NatsAdapter;
use crate::messaging::subscription::SubscriptionInfo;
use crate::messaging::traits::{BrokerAdapter, Delivery, MessageHandler};
use std::sync::Arc;

/// One or more topic names
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Topics(Vec<String>);

impl Topics {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Topics {
    fn from(topic: &str) -> Self {
        Self(vec![topic.to_string()])
    }
}

impl From<String> for Topics {
    fn from(topic: String) -> Self {
        Self(vec![topic])
    }
}

impl From<Vec<String>> for Topics {
    fn from(topics: Vec<String>) -> Self {
        Self(topics)
    }
}

impl From<Vec<&str>> for Topics {
    fn from(topics: Vec<&str>) -> Self {
        Self(topics.into_iter().map(str::to_string).collect())
    }
}

impl From<&[String]> for Topics {
    fn from(topics: &[String]) -> Self {
        Self(topics.to_vec())
    }
}

impl<const N: usize> From<[&str; N]> for Topics {
    fn from(topics: [&str; N]) -> Self {
        Self(topics.iter().map(|t| t.to_string()).collect())
    }
}

/// Build a client bound to the provider the options select
pub async fn get_client(
    options: MessagingOptions,
    ctx: Arc<ProcessContext>,
) -> MessagingResult<MessagingClient> {
    MessagingClient::new(options, ctx).await
}

/// Messaging client; every call goes to the adapter picked at construction
#[derive(Clone)]
pub struct MessagingClient {
    adapter: Arc<dyn BrokerAdapter>,
}

impl MessagingClient {
    /// Create a client for the selected provider
    pub async fn new(options: MessagingOptions, ctx: Arc<ProcessContext>) -> MessagingResult<Self> {
        let adapter: Arc<dyn BrokerAdapter> = match options {
            MessagingOptions::Kafka(config) => Arc::new(KafkaAdapter::new(config, ctx)?),
            MessagingOptions::Nats(config) => Arc::new(NatsAdapter::connect(config, ctx).await?),
        };
        Ok(Self::with_adapter(adapter))
    }

    /// Wrap an existing adapter
    pub fn with_adapter(adapter: Arc<dyn BrokerAdapter>) -> Self {
        Self { adapter }
    }

    pub fn provider(&self) -> Provider {
        self.adapter.provider()
    }

    /// Serialize and publish a message
    pub async fn publish(&self, topic: &str, message: &Message) -> MessagingResult<()> {
        let payload = message.to_vec()?;
        self.publish_raw(topic, payload).await
    }

    /// Publish an already serialized payload
    pub async fn publish_raw(&self, topic: &str, payload: Vec<u8>) -> MessagingResult<()> {
        let provider = self.provider();
        let size = payload.len();
        let result = self.adapter.publish(topic, payload).await;

        match &result {
            Ok(()) => {
                MESSAGING_METRICS
                    .messages_published
                    .with_label_values(&[provider.as_str(), topic])
                    .inc();
                tracing::debug!(provider = %provider, topic = %topic, bytes = size, "Message published");
            }
            Err(e) => {
                tracing::error!(provider = %provider, topic = %topic, error = %e, "Publish failed");
            }
        }

        result
    }

    /// Subscribe the handler to each topic; every topic gets its own subscription
    pub async fn subscribe(
        &self,
        topics: impl Into<Topics>,
        handler: Arc<dyn MessageHandler>,
    ) -> MessagingResult<Vec<SubscriptionInfo>> {
        let topics = topics.into();
        let mut infos = Vec::with_capacity(topics.as_slice().len());

        for topic in topics.as_slice() {
            let info = self.adapter.subscribe(topic, Arc::clone(&handler)).await?;
            tracing::info!(provider = %info.provider, topic = %topic, state = %info.state, "Subscribed");
            infos.push(info);
        }

        Ok(infos)
    }

    /// Close subscriptions on exactly the given topics
    pub async fn unsubscribe(&self, topics: impl Into<Topics>) -> usize {
        let topics = topics.into();
        let removed = self.adapter.unsubscribe(topics.as_slice()).await;
        tracing::info!(provider = %self.provider(), topics = ?topics.as_slice(), removed, "Unsubscribed");
        removed
    }

    /// Wait for the next message on a topic
    pub async fn last_message(&self, topic: &str) -> MessagingResult<Delivery> {
        self.adapter.last_message(topic).await
    }

    /// Create topics on backends that manage them
    pub async fn ensure_topics(&self, topics: impl Into<Topics>) -> MessagingResult<()> {
        self.adapter.ensure_topics(topics.into().as_slice()).await
    }

    /// Topic and state of every live subscription
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.adapter.registry().infos()
    }

    /// Close all subscriptions and release the connection
    pub async fn close(&self) -> MessagingResult<()> {
        self.adapter.close().await
    }
}

impl std::fmt::Debug for MessagingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingClient")
            .field("provider", &self.provider())
            .finish()
    }
}
