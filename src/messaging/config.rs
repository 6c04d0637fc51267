//! Messaging configuration

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Messaging backend a client is bound to
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Provider {
    /// Kafka - consumer groups, partitioned delivery
    #[default]
    Kafka,
    /// NATS - broadcast, ephemeral delivery
    Nats,
}

impl Provider {
    /// Every supported provider
    pub const ALL: [Provider; 2] = [Provider::Kafka, Provider::Nats];

    /// Namespace segment used for this provider on disk and in metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Kafka => "kafka",
            Provider::Nats => "nats",
        }
    }
}

/// Which providers a consumer of the whole bus (e.g. the replay recorder) attaches to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderSelection {
    Kafka,
    Nats,
    #[default]
    All,
}

impl ProviderSelection {
    /// Expand the selection into concrete providers
    pub fn providers(&self) -> Vec<Provider> {
        match self {
            ProviderSelection::Kafka => vec![Provider::Kafka],
            ProviderSelection::Nats => vec![Provider::Nats],
            ProviderSelection::All => Provider::ALL.to_vec(),
        }
    }

    /// Check whether a provider is part of the selection
    pub fn includes(&self, provider: Provider) -> bool {
        matches!(
            (self, provider),
            (ProviderSelection::All, _)
                | (ProviderSelection::Kafka, Provider::Kafka)
                | (ProviderSelection::Nats, Provider::Nats)
        )
    }
}

impl From<Provider> for ProviderSelection {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Kafka => ProviderSelection::Kafka,
            Provider::Nats => ProviderSelection::Nats,
        }
    }
}

/// Kafka configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KafkaConfig {
    /// Broker list, comma or space separated
    pub brokers: String,

    /// Client ID
    pub client_id: String,

    /// Consumer group ID; the process instance id is used when unset
    pub group_id: Option<String>,

    /// Session timeout in milliseconds
    pub session_timeout_ms: u64,

    /// Producer message timeout in milliseconds
    pub message_timeout_ms: u64,

    /// Admin operation timeout in milliseconds
    pub admin_timeout_ms: u64,

    /// Partitions for topics created on demand
    pub num_partitions: i32,

    /// Replication factor for topics created on demand
    pub replication_factor: i32,

    /// Enable SASL authentication
    pub enable_sasl: bool,

    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512)
    pub sasl_mechanism: Option<String>,

    /// SASL username
    pub sasl_username: Option<String>,

    /// SASL password
    pub sasl_password: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "kafka:9092".to_string(),
            client_id: "mq-replay".to_string(),
            group_id: None,
            session_timeout_ms: 30000,
            message_timeout_ms: 30000,
            admin_timeout_ms: 10000,
            num_partitions: 1,
            replication_factor: 1,
            enable_sasl: false,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
        }
    }
}

impl KafkaConfig {
    /// Broker list in the comma separated form librdkafka expects
    pub fn bootstrap_servers(&self) -> String {
        self.brokers
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// NATS configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NatsConfig {
    /// Process-wide switch; a disabled client turns every operation into a no-op
    pub enabled: bool,

    /// NATS server URL
    pub server: String,

    /// Authentication token
    pub token: Option<String>,

    /// Connection name
    pub connection_name: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: "nats://localhost:4222".to_string(),
            token: None,
            connection_name: "mq-replay".to_string(),
        }
    }
}

/// Options for a single messaging client, one variant per backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum MessagingOptions {
    Kafka(KafkaConfig),
    Nats(NatsConfig),
}

impl MessagingOptions {
    /// Provider these options select
    pub fn provider(&self) -> Provider {
        match self {
            MessagingOptions::Kafka(_) => Provider::Kafka,
            MessagingOptions::Nats(_) => Provider::Nats,
        }
    }
}

/// Settings for both backends plus the active provider
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessagingSettings {
    /// Provider used when none is requested explicitly
    pub provider: Provider,

    /// Kafka settings
    pub kafka: KafkaConfig,

    /// NATS settings
    pub nats: NatsConfig,
}

impl MessagingSettings {
    /// Options for the active provider
    pub fn options(&self) -> MessagingOptions {
        self.options_for(self.provider)
    }

    /// Options for a specific provider
    pub fn options_for(&self, provider: Provider) -> MessagingOptions {
        match provider {
            Provider::Kafka => MessagingOptions::Kafka(self.kafka.clone()),
            Provider::Nats => MessagingOptions::Nats(self.nats.clone()),
        }
    }

    /// Switch the active provider
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }
}
