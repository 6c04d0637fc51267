use crate::error::{AppError, Result};
use crate::messaging::{MessagingSettings, ProviderSelection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Plain environment variables honoured on top of the `MQ_REPLAY__*` overrides
const LEGACY_ENV: &[(&str, &str)] = &[
    ("KAFKA_BROKERS", "messaging.kafka.brokers"),
    ("NATS_SERVER", "messaging.nats.server"),
    ("NATS_TOKEN", "messaging.nats.token"),
    ("NATS_ENABLED", "messaging.nats.enabled"),
    ("MQ_PROVIDER", "messaging.provider"),
    ("CONSUL_HOST", "consul.host"),
    ("CONSUL_PORT", "consul.port"),
    ("LOG_LEVEL", "observability.log_level"),
];

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Identity of this process
    #[serde(default)]
    pub service: ServiceConfig,

    /// Broker settings
    #[serde(default)]
    pub messaging: MessagingSettings,

    /// Replay store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Key-value source for topic overrides
    #[serde(default)]
    pub consul: ConsulConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load configuration resolving plain variables through `lookup`
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config_path =
            lookup("CONFIG_PATH").unwrap_or_else(|| "config/default.toml".to_string());

        let mut builder = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: MQ_REPLAY__)
            .add_source(
                config::Environment::with_prefix("MQ_REPLAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_ENV {
            let value = lookup(var).map(|v| match *var {
                // brokers may be space separated
                "KAFKA_BROKERS" => v.split_whitespace().collect::<Vec<_>>().join(","),
                // any non-empty value switches NATS on
                "NATS_ENABLED" => (!v.trim().is_empty()).to_string(),
                _ => v,
            });
            builder = builder.set_override_option(*key, value)?;
        }
        if lookup("CONSUL_HOST").is_some() {
            builder = builder.set_override("consul.enabled", true)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the process cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.service.name.trim().is_empty() {
            return Err(AppError::Configuration(
                "service.name must not be empty".to_string(),
            ));
        }
        if self.storage.root.as_os_str().is_empty() {
            return Err(AppError::Configuration(
                "storage.root must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name stamped on every message header
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Fixed instance id; generated at startup when unset
    pub instance_id: Option<String>,

    /// Version announced in halo replies
    #[serde(default = "default_service_version")]
    pub version: String,

    /// Maintainer announced in halo replies
    #[serde(default)]
    pub maintainer: Option<String>,

    /// Capabilities announced in halo replies
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            instance_id: None,
            version: default_service_version(),
            maintainer: None,
            capabilities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the replay store
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Topic catalog file
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Providers the recorder attaches to
    #[serde(default)]
    pub providers: ProviderSelection,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            catalog_path: default_catalog_path(),
            providers: ProviderSelection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsulConfig {
    /// Resolve topic overrides through Consul
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_consul_host")]
    pub host: String,

    #[serde(default = "default_consul_port")]
    pub port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl ConsulConfig {
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_consul_host(),
            port: default_consul_port(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_service_name() -> String {
    "mq-replay".to_string()
}

fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/storage")
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("config/topics.yaml")
}

fn default_consul_host() -> String {
    "localhost".to_string()
}

fn default_consul_port() -> u16 {
    8500
}

fn default_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::Provider;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::load_with(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_embedded_defaults() {
        let config = load(&[("CONFIG_PATH", "does/not/exist")]).unwrap();
        assert_eq!(config.service.name, "mq-replay");
        assert_eq!(config.messaging.provider, Provider::Kafka);
        assert_eq!(config.messaging.kafka.brokers, "kafka:9092");
        assert!(!config.messaging.nats.enabled);
        assert_eq!(config.storage.providers, ProviderSelection::All);
        assert!(!config.consul.enabled);
    }

    #[test]
    fn test_legacy_variables_override() {
        let config = load(&[
            ("CONFIG_PATH", "does/not/exist"),
            ("KAFKA_BROKERS", "k1:9092 k2:9092"),
            ("NATS_ENABLED", "true"),
            ("NATS_TOKEN", "secret"),
            ("MQ_PROVIDER", "nats"),
            ("CONSUL_HOST", "consul.local"),
            ("CONSUL_PORT", "8501"),
        ])
        .unwrap();

        assert_eq!(config.messaging.kafka.brokers, "k1:9092,k2:9092");
        assert!(config.messaging.nats.enabled);
        assert_eq!(config.messaging.nats.token.as_deref(), Some("secret"));
        assert_eq!(config.messaging.provider, Provider::Nats);
        assert!(config.consul.enabled);
        assert_eq!(config.consul.base_url(), "http://consul.local:8501");
    }

    #[test]
    fn test_nats_enabled_by_any_non_empty_value() {
        for value in ["enabled", "1", "yes", "true"] {
            let config = load(&[("CONFIG_PATH", "does/not/exist"), ("NATS_ENABLED", value)]).unwrap();
            assert!(config.messaging.nats.enabled, "NATS_ENABLED={value}");
        }

        let config = load(&[("CONFIG_PATH", "does/not/exist"), ("NATS_ENABLED", "")]).unwrap();
        assert!(!config.messaging.nats.enabled);
    }

    #[test]
    fn test_service_defaults_for_halo() {
        let config = load(&[("CONFIG_PATH", "does/not/exist")]).unwrap();
        assert_eq!(config.service.version, env!("CARGO_PKG_VERSION"));
        assert!(config.service.capabilities.is_empty());
    }

    #[test]
    fn test_empty_service_name_rejected() {
        let mut config = Config::default();
        config.service.name = String::new();
        assert!(config.validate().unwrap_err().is_configuration());
    }
}
