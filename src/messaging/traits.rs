//! Messaging trait abstractions

use crate::messaging::config::Provider;
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::message::Message;
use crate::messaging::metrics::MESSAGING_METRICS;
use crate::messaging::subscription::{Subscription, SubscriptionInfo, SubscriptionRegistry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A message as received from a broker, before any parsing
#[derive(Debug, Clone)]
pub struct Delivery {
    pub provider: Provider,
    pub topic: String,
    pub payload: Vec<u8>,
    /// Kafka only
    pub partition: Option<i32>,
    /// Kafka only
    pub offset: Option<i64>,
    pub received_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(provider: Provider, topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            provider,
            topic: topic.into(),
            payload,
            partition: None,
            offset: None,
            received_at: Utc::now(),
        }
    }

    /// Parse the payload as a [`Message`]
    pub fn message(&self) -> serde_json::Result<Message> {
        Message::from_slice(&self.payload)
    }

    /// Parse the payload into any deserializable type
    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }

    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Receives the events of a subscription
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Called once per received message, each call on its own task
    async fn on_message(&self, delivery: Delivery);

    /// Called when the underlying consumer reports an error
    async fn on_error(&self, topic: &str, error: &MessagingError) {
        tracing::error!(topic = %topic, error = %error, "Subscription error");
    }

    /// Called once the subscription is live
    async fn on_ready(&self, topic: &str) {
        tracing::debug!(topic = %topic, "Subscription ready");
    }
}

/// Handler built from an async closure
pub struct FnHandler<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F, Fut>
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_message(&self, delivery: Delivery) {
        (self.f)(delivery).await
    }
}

/// Adapt an async closure into a shared [`MessageHandler`]
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler {
        f,
        _fut: PhantomData,
    })
}

/// Hand a delivery to its handler without waiting for the handler to finish
pub fn dispatch(handler: &Arc<dyn MessageHandler>, delivery: Delivery) {
    MESSAGING_METRICS
        .messages_consumed
        .with_label_values(&[delivery.provider.as_str(), &delivery.topic])
        .inc();

    let handler = Arc::clone(handler);
    tokio::spawn(async move {
        handler.on_message(delivery).await;
    });
}

/// Forwards the first delivery (or error) of a subscription
struct FirstDelivery {
    tx: mpsc::Sender<MessagingResult<Delivery>>,
}

#[async_trait]
impl MessageHandler for FirstDelivery {
    async fn on_message(&self, delivery: Delivery) {
        let _ = self.tx.try_send(Ok(delivery));
    }

    async fn on_error(&self, topic: &str, error: &MessagingError) {
        tracing::warn!(topic = %topic, error = %error, "Single-shot consumer failed");
        let _ = self.tx.try_send(Err(error.clone()));
    }
}

/// A broker backend
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Backend this adapter talks to
    fn provider(&self) -> Provider;

    /// Enqueue a payload; delivery failures are logged, not returned
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> MessagingResult<()>;

    /// Open a subscription without registering it
    async fn open(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> MessagingResult<Subscription>;

    /// Live subscriptions owned by this adapter
    fn registry(&self) -> &SubscriptionRegistry;

    /// Make sure the topics exist; backends without topic management accept anything
    async fn ensure_topics(&self, _topics: &[String]) -> MessagingResult<()> {
        Ok(())
    }

    /// Open and register a subscription
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> MessagingResult<SubscriptionInfo> {
        let subscription = self.open(topic, handler).await?;
        Ok(self.registry().insert(subscription))
    }

    /// Close every subscription on the given topics
    async fn unsubscribe(&self, topics: &[String]) -> usize {
        self.registry().remove(topics).await
    }

    /// Resolve with the first message received on the topic
    async fn last_message(&self, topic: &str) -> MessagingResult<Delivery> {
        let (tx, mut rx) = mpsc::channel(1);
        let subscription = self.open(topic, Arc::new(FirstDelivery { tx })).await?;

        let result = rx
            .recv()
            .await
            .unwrap_or_else(|| Err(MessagingError::SubscriptionClosed(topic.to_string())));
        subscription.close().await;
        result
    }

    /// Close every subscription and release the connection
    async fn close(&self) -> MessagingResult<()>;
}
