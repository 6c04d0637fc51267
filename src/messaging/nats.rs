//! NATS broker adapter

use crate::context::ProcessContext;
use crate::messaging::config::{NatsConfig, Provider};
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::metrics::MESSAGING_METRICS;
use crate::messaging::subscription::{Subscription, SubscriptionRegistry};
use crate::messaging::traits::{dispatch, BrokerAdapter, Delivery, MessageHandler};
use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;

/// NATS adapter
///
/// A disabled adapter holds no connection; publish and subscribe succeed
/// without touching the network.
pub struct NatsAdapter {
    ctx: Arc<ProcessContext>,
    client: Option<Client>,
    registry: SubscriptionRegistry,
}

impl NatsAdapter {
    /// Connect unless NATS is disabled
    pub async fn connect(config: NatsConfig, ctx: Arc<ProcessContext>) -> MessagingResult<Self> {
        let client = if config.enabled {
            let options = match &config.token {
                Some(token) => ConnectOptions::with_token(token.clone()),
                None => ConnectOptions::new(),
            }
            .name(&config.connection_name);

            let client = options.connect(config.server.as_str()).await.map_err(|e| {
                MessagingError::ConnectionFailed(format!("NATS connection failed: {}", e))
            })?;
            tracing::info!(server = %config.server, "Connected to NATS");
            Some(client)
        } else {
            tracing::info!("NATS disabled, operations are no-ops");
            None
        };

        Ok(Self {
            ctx,
            client,
            registry: SubscriptionRegistry::new(Provider::Nats),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl BrokerAdapter for NatsAdapter {
    fn provider(&self) -> Provider {
        Provider::Nats
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> MessagingResult<()> {
        let Some(client) = &self.client else {
            tracing::debug!(topic = %topic, "NATS disabled, publish skipped");
            return Ok(());
        };

        let started = Instant::now();
        client
            .publish(topic.to_string(), payload.into())
            .await
            .map_err(|e| {
                MESSAGING_METRICS
                    .publish_failures
                    .with_label_values(&["nats", topic])
                    .inc();
                MessagingError::PublishFailed(format!("NATS publish failed: {}", e))
            })?;

        MESSAGING_METRICS
            .publish_latency
            .with_label_values(&["nats"])
            .observe(started.elapsed().as_secs_f64());
        Ok(())
    }

    async fn open(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> MessagingResult<Subscription> {
        let (mut subscription, mut control) =
            Subscription::new(Provider::Nats, topic, Some(self.ctx.shutdown_signal()));

        let Some(client) = &self.client else {
            control.mark_active();
            return Ok(subscription);
        };

        let mut subscriber = client.subscribe(topic.to_string()).await.map_err(|e| {
            MessagingError::SubscribeFailed(format!("NATS subscribe failed: {}", e))
        })?;
        control.mark_active();

        let topic = topic.to_string();
        let task = tokio::spawn(async move {
            handler.on_ready(&topic).await;

            loop {
                tokio::select! {
                    _ = control.cancelled() => break,
                    next = subscriber.next() => match next {
                        Some(message) => {
                            let delivery = Delivery::new(
                                Provider::Nats,
                                message.subject.to_string(),
                                message.payload.to_vec(),
                            );
                            dispatch(&handler, delivery);
                        }
                        None => {
                            let error = MessagingError::SubscriptionClosed(topic.clone());
                            handler.on_error(&topic, &error).await;
                            break;
                        }
                    }
                }
            }

            if let Err(e) = subscriber.unsubscribe().await {
                tracing::warn!(topic = %topic, error = %e, "NATS unsubscribe failed");
            }
            control.mark_closed();
            tracing::debug!(topic = %topic, "NATS subscription closed");
        });
        subscription.attach(task);

        Ok(subscription)
    }

    fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    async fn close(&self) -> MessagingResult<()> {
        let closed = self.registry.close_all().await;

        if let Some(client) = &self.client {
            client
                .flush()
                .await
                .map_err(|e| MessagingError::PublishFailed(format!("NATS flush failed: {}", e)))?;
        }

        tracing::info!(subscriptions = closed, "NATS adapter closed");
        Ok(())
    }
}
