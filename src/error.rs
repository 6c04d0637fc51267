use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Broker connectivity or delivery errors
    #[error("Messaging error: {0}")]
    Messaging(String),

    /// Local replay store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Topic catalog errors
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Messaging(_) => "MESSAGING_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Catalog(_) => "CATALOG_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
        }
    }

    /// Whether the error stems from configuration rather than runtime conditions
    pub fn is_configuration(&self) -> bool {
        matches!(self, AppError::Configuration(_))
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from serde_yaml::Error
impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::Configuration("test".to_string()).error_code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(
            AppError::Storage("test".to_string()).error_code(),
            "STORAGE_ERROR"
        );
        assert_eq!(AppError::Timeout("t".to_string()).error_code(), "TIMEOUT");
    }

    #[test]
    fn test_yaml_error_maps_to_serialization() {
        let err: AppError = serde_yaml::from_str::<Vec<String>>("{ not: [a list")
            .unwrap_err()
            .into();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
        assert!(!err.is_configuration());
    }
}
