//! Common test utilities: an in-process broker and message builders

#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use mq_replay::messaging::{
    dispatch, BrokerAdapter, Delivery, Header, Message, MessageCategory, MessageHandler,
    MessagingClient, MessagingResult, Provider, Subscription, SubscriptionRegistry,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Broker that delivers published payloads to subscribers in the same process
pub struct LoopbackAdapter {
    provider: Provider,
    registry: SubscriptionRegistry,
    routes: DashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl LoopbackAdapter {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            registry: SubscriptionRegistry::new(provider),
            routes: DashMap::new(),
        }
    }
}

#[async_trait]
impl BrokerAdapter for LoopbackAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> MessagingResult<()> {
        if let Some(mut senders) = self.routes.get_mut(topic) {
            senders.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn open(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> MessagingResult<Subscription> {
        let (mut subscription, mut control) = Subscription::new(self.provider, topic, None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.routes.entry(topic.to_string()).or_default().push(tx);

        let provider = self.provider;
        let topic = topic.to_string();
        control.mark_active();
        subscription.attach(tokio::spawn(async move {
            handler.on_ready(&topic).await;
            loop {
                tokio::select! {
                    _ = control.cancelled() => break,
                    payload = rx.recv() => match payload {
                        Some(payload) => dispatch(&handler, Delivery::new(provider, topic.clone(), payload)),
                        None => break,
                    }
                }
            }
            control.mark_closed();
        }));

        Ok(subscription)
    }

    fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    async fn close(&self) -> MessagingResult<()> {
        self.registry.close_all().await;
        self.routes.clear();
        Ok(())
    }
}

/// Client backed by a fresh loopback broker
pub fn loopback_client(provider: Provider) -> MessagingClient {
    MessagingClient::with_adapter(Arc::new(LoopbackAdapter::new(provider)))
}

/// Message of the given flow carrying `n` in its body
pub fn sample_message(flow_id: &str, n: i64) -> Message {
    Message::new(Header::new(
        MessageCategory::BusinessEvent,
        "sample_emitted",
        "tests",
        "test-instance",
        "conn-1",
        flow_id,
    ))
    .with_origin("tests", None)
    .with_body(json!({ "n": n, "nested": { "list": [1, 2, 3] } }))
}

/// Poll `check` until it returns true or five seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
