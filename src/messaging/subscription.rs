//! Subscription handles and the per-adapter registry

use crate::messaging::config::Provider;
use crate::messaging::metrics::MESSAGING_METRICS;
use dashmap::DashMap;
use serde::Serialize;
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Lifecycle of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Active,
    Closed,
}

/// Snapshot of a subscription
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionInfo {
    pub id: Uuid,
    pub provider: Provider,
    pub topic: String,
    pub state: SubscriptionState,
}

/// Caller-side handle of a running subscription
///
/// Dropping the handle stops delivery just like [`Subscription::close`], without
/// waiting for the consuming task to finish.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    provider: Provider,
    topic: String,
    state_rx: watch::Receiver<SubscriptionState>,
    close_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

/// Task-side half of a subscription
#[derive(Debug)]
pub struct SubscriptionControl {
    topic: String,
    state_tx: watch::Sender<SubscriptionState>,
    close_rx: watch::Receiver<bool>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl Subscription {
    /// Create a handle in the `Subscribing` state
    ///
    /// `shutdown` is the process shutdown signal; the task-side control reports
    /// cancellation when either the handle is closed or the process shuts down.
    pub fn new(
        provider: Provider,
        topic: impl Into<String>,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> (Self, SubscriptionControl) {
        let topic = topic.into();
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Subscribing);
        let (close_tx, close_rx) = watch::channel(false);

        let subscription = Self {
            id: Uuid::new_v4(),
            provider,
            topic: topic.clone(),
            state_rx,
            close_tx,
            task: None,
        };
        let control = SubscriptionControl {
            topic,
            state_tx,
            close_rx,
            shutdown_rx: shutdown,
        };
        (subscription, control)
    }

    /// Attach the task that drives delivery
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state_rx.borrow()
    }

    pub fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id,
            provider: self.provider,
            topic: self.topic.clone(),
            state: self.state(),
        }
    }

    /// Wait until the subscription leaves `Subscribing`
    pub async fn ready(&self) -> SubscriptionState {
        let mut rx = self.state_rx.clone();
        let state = match rx
            .wait_for(|state| *state != SubscriptionState::Subscribing)
            .await
        {
            Ok(state) => *state,
            Err(_) => SubscriptionState::Closed,
        };
        state
    }

    /// Stop delivery and wait for the consuming task to finish
    pub async fn close(mut self) {
        self.close_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(topic = %self.topic, error = %e, "Subscription task ended abnormally");
            }
        }
        tracing::debug!(provider = %self.provider, topic = %self.topic, "Subscription closed");
    }
}

impl SubscriptionControl {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Move to `Active`; returns true on the first transition only
    pub fn mark_active(&self) -> bool {
        self.state_tx.send_if_modified(|state| {
            if *state == SubscriptionState::Subscribing {
                *state = SubscriptionState::Active;
                true
            } else {
                false
            }
        })
    }

    pub fn mark_closed(&self) {
        self.state_tx.send_replace(SubscriptionState::Closed);
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state_tx.borrow()
    }

    /// Whether the handle was closed/dropped or the process is shutting down
    pub fn is_cancelled(&self) -> bool {
        let closed = *self.close_rx.borrow() || self.close_rx.has_changed().is_err();
        let shutting_down = self
            .shutdown_rx
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false);
        closed || shutting_down
    }

    /// Resolve once the subscription should stop
    pub async fn cancelled(&mut self) {
        let Self {
            close_rx,
            shutdown_rx,
            ..
        } = self;

        let closed = async {
            // Err means the handle was dropped, which also cancels
            let _ = close_rx.wait_for(|closed| *closed).await;
        };
        let shutdown = async {
            match shutdown_rx.as_mut() {
                Some(rx) => {
                    if rx.wait_for(|down| *down).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = closed => {}
            _ = shutdown => {}
        }
    }
}

/// Live subscriptions of one adapter, keyed by topic
#[derive(Debug)]
pub struct SubscriptionRegistry {
    provider: Provider,
    entries: DashMap<String, Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            entries: DashMap::new(),
        }
    }

    /// Register a subscription and return its snapshot
    pub fn insert(&self, subscription: Subscription) -> SubscriptionInfo {
        let info = subscription.info();
        self.entries
            .entry(subscription.topic.clone())
            .or_default()
            .push(subscription);

        MESSAGING_METRICS
            .active_subscriptions
            .with_label_values(&[self.provider.as_str()])
            .inc();
        info
    }

    /// Close every subscription on the given topics; other topics are untouched
    pub async fn remove(&self, topics: &[String]) -> usize {
        let mut removed = Vec::new();
        for topic in topics {
            if let Some((_, subscriptions)) = self.entries.remove(topic) {
                removed.extend(subscriptions);
            }
        }
        self.close_many(removed).await
    }

    /// Close everything
    pub async fn close_all(&self) -> usize {
        let topics = self.topics();
        self.remove(&topics).await
    }

    pub fn topics(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn infos(&self) -> Vec<SubscriptionInfo> {
        self.entries
            .iter()
            .flat_map(|entry| entry.value().iter().map(Subscription::info).collect::<Vec<_>>())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn close_many(&self, subscriptions: Vec<Subscription>) -> usize {
        let count = subscriptions.len();
        for subscription in subscriptions {
            subscription.close().await;
            MESSAGING_METRICS
                .active_subscriptions
                .with_label_values(&[self.provider.as_str()])
                .dec();
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_idle(provider: Provider, topic: &str) -> Subscription {
        let (mut subscription, mut control) = Subscription::new(provider, topic, None);
        control.mark_active();
        subscription.attach(tokio::spawn(async move {
            control.cancelled().await;
            control.mark_closed();
        }));
        subscription
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let (subscription, control) = Subscription::new(Provider::Nats, "t1", None);
        assert_eq!(subscription.state(), SubscriptionState::Subscribing);

        assert!(control.mark_active());
        assert!(!control.mark_active());
        assert_eq!(subscription.ready().await, SubscriptionState::Active);

        control.mark_closed();
        assert_eq!(subscription.state(), SubscriptionState::Closed);
    }

    #[tokio::test]
    async fn test_ready_waits_for_activation() {
        let (subscription, control) = Subscription::new(Provider::Kafka, "t1", None);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            control.mark_active();
            // keep the sender alive until the waiter has seen Active
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });

        assert_eq!(subscription.ready().await, SubscriptionState::Active);
    }

    #[tokio::test]
    async fn test_ready_is_closed_when_task_never_starts() {
        let (subscription, control) = Subscription::new(Provider::Kafka, "t1", None);
        drop(control);

        assert_eq!(subscription.ready().await, SubscriptionState::Closed);
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels_task() {
        let (subscription, mut control) = Subscription::new(Provider::Kafka, "t1", None);
        drop(subscription);
        control.cancelled().await;
        assert!(control.is_cancelled());
    }

    #[tokio::test]
    async fn test_process_shutdown_cancels_task() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (_subscription, mut control) =
            Subscription::new(Provider::Kafka, "t1", Some(shutdown_rx));
        assert!(!control.is_cancelled());

        shutdown_tx.send_replace(true);
        control.cancelled().await;
        assert!(control.is_cancelled());
    }

    #[tokio::test]
    async fn test_registry_partial_removal() {
        let registry = SubscriptionRegistry::new(Provider::Nats);
        registry.insert(spawn_idle(Provider::Nats, "a"));
        registry.insert(spawn_idle(Provider::Nats, "a"));
        registry.insert(spawn_idle(Provider::Nats, "b"));
        assert_eq!(registry.len(), 3);

        let removed = registry.remove(&["a".to_string(), "missing".to_string()]).await;
        assert_eq!(removed, 2);
        assert_eq!(registry.topics(), vec!["b".to_string()]);

        assert_eq!(registry.close_all().await, 1);
        assert!(registry.is_empty());
    }
}
