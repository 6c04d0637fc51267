//! Unified publish/subscribe over Kafka and NATS
//!
//! Callers hold a [`MessagingClient`] bound to one provider. Both providers
//! implement [`BrokerAdapter`], so application code is written once and the
//! backend is chosen by configuration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              MessagingClient                     │
//! ├─────────────────────────────────────────────────┤
//! │  - publish()      - subscribe()                  │
//! │  - unsubscribe()  - last_message()               │
//! └─────────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │      BrokerAdapter + SubscriptionRegistry        │
//! └─────────────────────────────────────────────────┘
//!           │                        │
//!           ▼                        ▼
//! ┌──────────────────┐    ┌──────────────────┐
//! │  Kafka Adapter   │    │  NATS Adapter    │
//! ├──────────────────┤    ├──────────────────┤
//! │ - Consumer groups│    │ - Broadcast      │
//! │ - Topic creation │    │ - Ephemeral      │
//! │ - Partitioning   │    │ - Can be disabled│
//! └──────────────────┘    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use mq_replay::context::ProcessContext;
//! use mq_replay::messaging::{get_client, handler_fn, Delivery, MessageCategory, Message, MessagingSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = ProcessContext::new("billing");
//!     let client = get_client(MessagingSettings::default().options(), ctx.clone()).await?;
//!
//!     client
//!         .subscribe(["orders"], handler_fn(|delivery: Delivery| async move {
//!             println!("{}", delivery.payload_str());
//!         }))
//!         .await?;
//!
//!     let header = ctx.header(MessageCategory::BusinessEvent, "order_created", "conn-1", "flow-1");
//!     client.publish("orders", &Message::new(header)).await?;
//!
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod kafka;
mod message;
mod metrics;
mod nats;
mod subscription;
mod traits;

pub use client::{get_client, MessagingClient, Topics};
pub use config::{
    KafkaConfig, MessagingOptions, MessagingSettings, NatsConfig, Provider, ProviderSelection,
};
pub use error::{MessagingError, MessagingResult};
pub use kafka::{GroupConsumer, GroupContext, GroupMembership, KafkaAdapter};
pub use message::{Header, Identity, Message, MessageCategory, Origin};
pub use metrics::{init_messaging_metrics, MESSAGING_METRICS};
pub use nats::NatsAdapter;
pub use subscription::{
    Subscription, SubscriptionControl, SubscriptionInfo, SubscriptionRegistry, SubscriptionState,
};
pub use traits::{dispatch, handler_fn, BrokerAdapter, Delivery, FnHandler, MessageHandler};
