//! Unified Kafka/NATS messaging with a flow-indexed local replay store
//!
//! - [`messaging`]: provider-agnostic publish/subscribe
//! - [`replay`]: records bus traffic to disk, keyed by provider, topic and flow id
//! - [`catalog`]: resolves logical topic names from a YAML catalog and Consul

pub mod admin;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod messaging;
pub mod replay;
pub mod telemetry;

pub use config::Config;
pub use context::ProcessContext;
pub use error::{AppError, Result};
