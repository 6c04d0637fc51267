//! Process-scoped identity and shutdown signal
//!
//! Created once at startup and handed to every adapter and factory that needs
//! the service identity or must stop on process termination.

use crate::config::ServiceConfig;
use crate::error::{AppError, Result};
use crate::messaging::{Header, MessageCategory};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Process identity and lifecycle shared across the messaging layer
#[derive(Debug)]
pub struct ProcessContext {
    service_name: String,
    instance_id: String,
    shutdown_tx: watch::Sender<bool>,
}

impl ProcessContext {
    /// Create a context with a freshly generated instance id
    pub fn new(service_name: impl Into<String>) -> Arc<Self> {
        Self::with_instance_id(service_name, uuid::Uuid::new_v4().to_string())
    }

    /// Create a context with a known instance id
    pub fn with_instance_id(
        service_name: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            service_name: service_name.into(),
            instance_id: instance_id.into(),
            shutdown_tx,
        })
    }

    /// Build the context from configuration; a missing service identity is fatal
    pub fn from_config(config: &ServiceConfig) -> Result<Arc<Self>> {
        let name = config.name.trim();
        if name.is_empty() {
            return Err(AppError::Configuration(
                "service.name must be set to identify this process".to_string(),
            ));
        }

        Ok(match config.instance_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Self::with_instance_id(name, id),
            _ => Self::new(name),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Unique id of this process; default Kafka consumer group
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Build a message header stamped with this process identity
    pub fn header(
        &self,
        category: MessageCategory,
        action: impl Into<String>,
        connection_id: impl Into<String>,
        flow_id: impl Into<String>,
    ) -> Header {
        Header::new(
            category,
            action,
            self.service_name.clone(),
            self.instance_id.clone(),
            connection_id,
            flow_id,
        )
    }

    /// Receiver that flips to `true` once shutdown begins
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Begin shutdown; every subscription observing the signal closes
    pub fn trigger_shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            tracing::info!(instance_id = %self.instance_id, "Process shutdown triggered");
        }
    }

    /// Trigger shutdown when the process receives an interrupt
    pub fn spawn_interrupt_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let ctx = Arc::clone(self);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Interrupt received, closing consumers");
                    ctx.trigger_shutdown();
                }
                Err(e) => tracing::error!(error = %e, "Failed to listen for interrupt signal"),
            }
        })
    }
}
