//! Error types for the topic catalog

use crate::error::AppError;
use std::path::PathBuf;

/// Result type for catalog operations
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur while resolving topics
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Catalog file missing or unreadable
    #[error("Cannot read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catalog file is not valid YAML of the expected shape
    #[error("Invalid catalog {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Key-value lookup failed
    #[error("Lookup of {key} failed: {reason}")]
    Lookup { key: String, reason: String },

    /// Stored value could not be decoded
    #[error("Cannot decode value of {key}: {reason}")]
    Decode { key: String, reason: String },
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Read { source, .. } => AppError::Io(source),
            other => AppError::Catalog(other.to_string()),
        }
    }
}
