//! Error types for the replay store

use crate::error::AppError;
use crate::messaging::{MessagingError, Provider};
use std::path::PathBuf;

/// Result type for replay operations
pub type ReplayResult<T> = std::result::Result<T, ReplayError>;

/// Errors that can occur while recording or reading messages
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Filesystem failure
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A key segment would escape the store root or is empty
    #[error("Invalid {kind} '{value}': {reason}")]
    InvalidKey {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    /// Message could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Query for a provider this recorder is not attached to
    #[error("Provider {0} is not recorded")]
    ProviderNotRecorded(Provider),

    /// Broker failure while starting or stopping the recorder
    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

impl ReplayError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ReplayError::Io { path, source }
    }
}

impl From<serde_json::Error> for ReplayError {
    fn from(err: serde_json::Error) -> Self {
        ReplayError::Serialization(err.to_string())
    }
}

impl From<ReplayError> for AppError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::Io { source, .. } => AppError::Io(source),
            ReplayError::ProviderNotRecorded(_) => AppError::Configuration(err.to_string()),
            ReplayError::Serialization(msg) => AppError::Serialization(msg),
            ReplayError::Messaging(e) => e.into(),
            ReplayError::InvalidKey { .. } => AppError::Storage(err.to_string()),
        }
    }
}
