//! Replay recorder: subscribes to catalog topics and persists every message

use crate::catalog::{get_topics_list, KeyValueSource};
use crate::context::ProcessContext;
use crate::messaging::{
    get_client, Delivery, MessageHandler, MessagingClient, MessagingOptions,
    MessagingSettings, Provider, ProviderSelection, SubscriptionState, MESSAGING_METRICS,
};
use crate::replay::error::{ReplayError, ReplayResult};
use crate::replay::store::ReplayStore;
use async_trait::async_trait;
use dashmap::DashSet;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Persists each delivery of one provider
struct PersistingHandler {
    store: ReplayStore,
    provider: Provider,
}

#[async_trait]
impl MessageHandler for PersistingHandler {
    async fn on_message(&self, delivery: Delivery) {
        let envelope = match delivery.parse::<Value>() {
            Ok(envelope) => envelope,
            Err(e) => {
                self.drop_malformed(&delivery, &e.to_string());
                return;
            }
        };
        let Some(flow_id) = flow_id_of(&envelope) else {
            self.drop_malformed(&delivery, "missing header");
            return;
        };

        match self
            .store
            .append(self.provider, &delivery.topic, &flow_id, &envelope)
            .await
        {
            Ok(_) => {
                MESSAGING_METRICS
                    .stored_messages
                    .with_label_values(&[self.provider.as_str(), &delivery.topic])
                    .inc();
            }
            Err(e) => {
                tracing::error!(
                    provider = %self.provider,
                    topic = %delivery.topic,
                    flow_id = %flow_id,
                    error = %e,
                    "Failed to store message"
                );
                MESSAGING_METRICS
                    .dropped_messages
                    .with_label_values(&[self.provider.as_str(), "storage"])
                    .inc();
            }
        }
    }
}

impl PersistingHandler {
    fn drop_malformed(&self, delivery: &Delivery, reason: &str) {
        tracing::warn!(
            provider = %self.provider,
            topic = %delivery.topic,
            error = %reason,
            payload = %delivery.payload_str(),
            "Dropping message that is not a JSON envelope"
        );
        MESSAGING_METRICS
            .dropped_messages
            .with_label_values(&[self.provider.as_str(), "malformed"])
            .inc();
    }
}

/// Flow id of a received envelope; `None` when it has no header object
///
/// A missing or null flow id is empty; scalar ids are stringified.
fn flow_id_of(envelope: &Value) -> Option<String> {
    let header = envelope.get("header")?.as_object()?;
    Some(match header.get("flow_id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

/// State of one managed (provider, topic) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicState {
    pub provider: Provider,
    pub topic: String,
    pub state: SubscriptionState,
}

/// Records catalog topics into a [`ReplayStore`]
pub struct LocalStorage {
    store: ReplayStore,
    topics: Vec<String>,
    clients: BTreeMap<Provider, MessagingClient>,
    closed: DashSet<String>,
}

impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage")
            .field("root", &self.store.root())
            .field("topics", &self.topics)
            .field("providers", &self.providers())
            .finish()
    }
}

/// Resolve the catalog topics and start recording them on every selected provider
pub async fn start_local_storage(
    catalog_path: impl AsRef<Path>,
    selection: ProviderSelection,
    settings: &MessagingSettings,
    kv: &dyn KeyValueSource,
    ctx: Arc<ProcessContext>,
    root: impl Into<PathBuf>,
) -> ReplayResult<LocalStorage> {
    let topics = get_topics_list(catalog_path, kv).await;
    tracing::info!(topics = ?topics, providers = %selection, "Replay recorder topics resolved");

    let mut clients = Vec::new();
    for provider in selection.providers() {
        let options = match settings.options_for(provider) {
            MessagingOptions::Kafka(mut kafka) => {
                // own group so the recorder sees every partition
                if kafka.group_id.is_none() {
                    kafka.group_id = Some(format!("{}-replay-store", ctx.instance_id()));
                }
                MessagingOptions::Kafka(kafka)
            }
            other => other,
        };
        clients.push(get_client(options, Arc::clone(&ctx)).await?);
    }

    LocalStorage::start_with(ReplayStore::new(root), topics, clients).await
}

impl LocalStorage {
    /// Start recording `topics` through already built clients, one per provider
    pub async fn start_with(
        store: ReplayStore,
        topics: Vec<String>,
        clients: Vec<MessagingClient>,
    ) -> ReplayResult<Self> {
        if topics.is_empty() {
            tracing::warn!("Replay recorder has no topics to record");
        }

        let clients: BTreeMap<Provider, MessagingClient> = clients
            .into_iter()
            .map(|client| (client.provider(), client))
            .collect();

        for (provider, client) in &clients {
            let handler: Arc<dyn MessageHandler> = Arc::new(PersistingHandler {
                store: store.clone(),
                provider: *provider,
            });

            for topic in &topics {
                if let Err(e) = client.subscribe(topic.as_str(), Arc::clone(&handler)).await {
                    tracing::error!(provider = %provider, topic = %topic, error = %e, "Replay recorder could not subscribe");
                }
            }
        }

        tracing::info!(
            root = %store.root().display(),
            topics = topics.len(),
            providers = clients.len(),
            "Replay recorder started"
        );

        Ok(Self {
            store,
            topics,
            clients,
            closed: DashSet::new(),
        })
    }

    pub fn store(&self) -> &ReplayStore {
        &self.store
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.clients.keys().copied().collect()
    }

    /// Stored messages of one flow, as received
    pub async fn messages(
        &self,
        topic: &str,
        flow_id: &str,
        provider: Provider,
    ) -> ReplayResult<Vec<Value>> {
        self.ensure_recorded(provider)?;
        self.store.messages(topic, flow_id, provider).await
    }

    /// Flow ids stored for a topic
    pub async fn flows(&self, provider: Provider, topic: &str) -> ReplayResult<Vec<String>> {
        self.ensure_recorded(provider)?;
        self.store.flows(provider, topic).await
    }

    /// Stop recording exactly these topics on every provider
    pub async fn unsubscribe(&self, topics: &[String]) -> usize {
        let mut removed = 0;
        for client in self.clients.values() {
            removed += client.unsubscribe(topics.to_vec()).await;
        }
        for topic in topics {
            self.closed.insert(topic.clone());
        }
        removed
    }

    /// State of every managed (provider, topic) pair
    pub fn topic_states(&self) -> Vec<TopicState> {
        let mut states = Vec::new();
        for (provider, client) in &self.clients {
            let live = client.subscriptions();
            for topic in &self.topics {
                let state = live
                    .iter()
                    .find(|info| &info.topic == topic)
                    .map(|info| info.state)
                    .unwrap_or_else(|| {
                        if self.closed.contains(topic) {
                            SubscriptionState::Closed
                        } else {
                            SubscriptionState::Unsubscribed
                        }
                    });
                states.push(TopicState {
                    provider: *provider,
                    topic: topic.clone(),
                    state,
                });
            }
        }
        states
    }

    /// Close every subscription and connection
    pub async fn stop(&self) -> ReplayResult<()> {
        let mut first_error = None;
        for topic in &self.topics {
            self.closed.insert(topic.clone());
        }
        for (provider, client) in &self.clients {
            if let Err(e) = client.close().await {
                tracing::error!(provider = %provider, error = %e, "Failed to close recorder client");
                first_error.get_or_insert(ReplayError::from(e));
            }
        }
        tracing::info!("Replay recorder stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn ensure_recorded(&self, provider: Provider) -> ReplayResult<()> {
        if self.clients.contains_key(&provider) {
            Ok(())
        } else {
            Err(ReplayError::ProviderNotRecorded(provider))
        }
    }
}
