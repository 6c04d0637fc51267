//! Admin subscriptions every running service answers
//!
//! - `halo`: service discovery. A request whose header action is `halo` is
//!   answered on the `halo_emit` topic with this service's identity, keeping
//!   the caller's connection id, flow id and origin.
//! - `logflush`: the message text is written to the log.
//!
//! Topic names are resolved through the [`KeyValueSource`] with fixed defaults.

use crate::catalog::{resolve_key, KeyValueSource};
use crate::config::ServiceConfig;
use crate::context::ProcessContext;
use crate::messaging::{
    Delivery, Message, MessageCategory, MessageHandler, MessagingClient, MessagingResult, Origin,
    SubscriptionInfo,
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const HALO_KEY: &str = "kafka/topics/topic/admin/halo";
pub const HALO_EMIT_KEY: &str = "kafka/topics/topic/service/halo_emit";
pub const LOGFLUSH_KEY: &str = "kafka/topics/topic/admin/logflush";

const HALO_ACTION: &str = "halo";
const HALO_EMIT_ACTION: &str = "halo_emit";

/// Concrete names of the admin topics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminTopics {
    pub halo: String,
    pub halo_emit: String,
    pub logflush: String,
}

impl Default for AdminTopics {
    fn default() -> Self {
        Self {
            halo: "halo".to_string(),
            halo_emit: "halo_emit".to_string(),
            logflush: "logflush".to_string(),
        }
    }
}

impl AdminTopics {
    /// Apply overrides from the key-value source
    pub async fn resolve(kv: &dyn KeyValueSource) -> Self {
        let defaults = Self::default();
        let lookup = |key: &'static str, default: String| async move {
            resolve_key(key, Some(default.as_str()), kv).await.unwrap_or(default)
        };

        Self {
            halo: lookup(HALO_KEY, defaults.halo).await,
            halo_emit: lookup(HALO_EMIT_KEY, defaults.halo_emit).await,
            logflush: lookup(LOGFLUSH_KEY, defaults.logflush).await,
        }
    }
}

/// Identity announced in halo replies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInfo {
    pub service_name: String,
    pub version: String,
    pub maintainer: Option<String>,
    pub capabilities: Vec<String>,
}

impl ServiceInfo {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            service_name: config.name.clone(),
            version: config.version.clone(),
            maintainer: config.maintainer.clone(),
            capabilities: config.capabilities.clone(),
        }
    }
}

/// Answers halo requests on the reply topic
pub struct HaloResponder {
    client: MessagingClient,
    ctx: Arc<ProcessContext>,
    reply_topic: String,
    info: ServiceInfo,
}

impl HaloResponder {
    pub fn new(
        client: MessagingClient,
        ctx: Arc<ProcessContext>,
        reply_topic: impl Into<String>,
        info: ServiceInfo,
    ) -> Self {
        Self {
            client,
            ctx,
            reply_topic: reply_topic.into(),
            info,
        }
    }

    /// Reply for a request; `None` unless it is a halo request
    pub fn reply_to(&self, request: &Value) -> Option<Message> {
        let header = request.get("header")?.as_object()?;
        if header.get("action").and_then(Value::as_str) != Some(HALO_ACTION) {
            return None;
        }

        let field = |name: &str| {
            header
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let origin: Origin = request
            .get("origin")
            .cloned()
            .and_then(|origin| serde_json::from_value(origin).ok())
            .unwrap_or_default();

        let mut reply = Message::new(self.ctx.header(
            MessageCategory::AdminEvent,
            HALO_EMIT_ACTION,
            field("connection_id"),
            field("flow_id"),
        ))
        .with_body(json!({
            "service_name": self.info.service_name,
            "version": self.info.version,
            "maintainer": self.info.maintainer,
            "capabilities": self.info.capabilities,
        }));
        reply.origin = origin;
        Some(reply)
    }
}

#[async_trait]
impl MessageHandler for HaloResponder {
    async fn on_message(&self, delivery: Delivery) {
        let request = match delivery.parse::<Value>() {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(
                    topic = %delivery.topic,
                    error = %e,
                    payload = %delivery.payload_str(),
                    "Halo message is not JSON"
                );
                return;
            }
        };
        let Some(reply) = self.reply_to(&request) else {
            return;
        };

        match self.client.publish(&self.reply_topic, &reply).await {
            Ok(()) => tracing::info!(
                topic = %self.reply_topic,
                flow_id = %reply.flow_id(),
                "Answered halo"
            ),
            Err(e) => tracing::error!(topic = %self.reply_topic, error = %e, "Failed to answer halo"),
        }
    }
}

/// Writes logflush messages to the log
pub struct LogflushLogger;

#[async_trait]
impl MessageHandler for LogflushLogger {
    async fn on_message(&self, delivery: Delivery) {
        match delivery.parse::<Value>() {
            Ok(value) => {
                let message = match &value["body"]["message"] {
                    Value::String(text) => text.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                tracing::info!(topic = %delivery.topic, message = %message, "LOGFLUSH message");
            }
            Err(e) => tracing::error!(
                topic = %delivery.topic,
                error = %e,
                "Logflush message is not JSON"
            ),
        }
    }
}

/// Subscribe the logflush logger and the halo responder on `client`
pub async fn start_admin_subscriptions(
    client: &MessagingClient,
    ctx: Arc<ProcessContext>,
    topics: &AdminTopics,
    info: ServiceInfo,
) -> MessagingResult<Vec<SubscriptionInfo>> {
    let mut subscriptions = client
        .subscribe(topics.logflush.as_str(), Arc::new(LogflushLogger))
        .await?;

    let responder = HaloResponder::new(client.clone(), ctx, topics.halo_emit.clone(), info);
    subscriptions.extend(
        client
            .subscribe(topics.halo.as_str(), Arc::new(responder))
            .await?,
    );

    tracing::info!(
        provider = %client.provider(),
        halo = %topics.halo,
        logflush = %topics.logflush,
        "Admin subscriptions started"
    );
    Ok(subscriptions)
}
