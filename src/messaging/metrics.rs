//! Prometheus metrics for messaging and local storage

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec,
};

/// Messaging metrics
pub struct MessagingMetrics {
    /// Messages published counter
    pub messages_published: CounterVec,

    /// Messages consumed counter
    pub messages_consumed: CounterVec,

    /// Message publish failures
    pub publish_failures: CounterVec,

    /// Message consume failures
    pub consume_failures: CounterVec,

    /// Live subscriptions gauge
    pub active_subscriptions: GaugeVec,

    /// Message publish latency
    pub publish_latency: HistogramVec,

    /// Messages written to the replay store
    pub stored_messages: CounterVec,

    /// Messages the replay recorder could not persist
    pub dropped_messages: CounterVec,
}

lazy_static! {
    pub static ref MESSAGING_METRICS: MessagingMetrics = MessagingMetrics {
        messages_published: register_counter_vec!(
            "mq_messages_published_total",
            "Total number of messages published",
            &["backend", "topic"]
        )
        .unwrap(),

        messages_consumed: register_counter_vec!(
            "mq_messages_consumed_total",
            "Total number of messages consumed",
            &["backend", "topic"]
        )
        .unwrap(),

        publish_failures: register_counter_vec!(
            "mq_publish_failures_total",
            "Total number of publish failures",
            &["backend", "topic"]
        )
        .unwrap(),

        consume_failures: register_counter_vec!(
            "mq_consume_failures_total",
            "Total number of consume failures",
            &["backend", "topic"]
        )
        .unwrap(),

        active_subscriptions: register_gauge_vec!(
            "mq_active_subscriptions",
            "Number of live subscriptions",
            &["backend"]
        )
        .unwrap(),

        publish_latency: register_histogram_vec!(
            "mq_publish_latency_seconds",
            "Message publish latency in seconds",
            &["backend"]
        )
        .unwrap(),

        stored_messages: register_counter_vec!(
            "mq_replay_stored_messages_total",
            "Total number of messages persisted to the replay store",
            &["backend", "topic"]
        )
        .unwrap(),

        dropped_messages: register_counter_vec!(
            "mq_replay_dropped_messages_total",
            "Total number of messages the replay recorder dropped",
            &["backend", "reason"]
        )
        .unwrap(),
    };
}

/// Initialize messaging metrics
pub fn init_messaging_metrics() {
    lazy_static::initialize(&MESSAGING_METRICS);
}
