//! Message model carried over both brokers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

/// Message category
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageCategory {
    BusinessCommand,
    BusinessEvent,
    BusinessQuery,
    AdminCommand,
    AdminEvent,
    AdminQuery,
}

/// Message header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub category: MessageCategory,
    pub action: String,
    /// Unique per message instance; identity only, never correlation
    pub message_uuid: String,
    pub service_name: String,
    pub service_uuid: String,
    pub connection_id: String,
    /// Correlation key shared by every message of one logical flow
    pub flow_id: String,
}

impl Header {
    /// Create a header with a fresh message uuid
    pub fn new(
        category: MessageCategory,
        action: impl Into<String>,
        service_name: impl Into<String>,
        service_uuid: impl Into<String>,
        connection_id: impl Into<String>,
        flow_id: impl Into<String>,
    ) -> Self {
        Self {
            category,
            action: action.into(),
            message_uuid: uuid::Uuid::new_v4().to_string(),
            service_name: service_name.into(),
            service_uuid: service_uuid.into(),
            connection_id: connection_id.into(),
            flow_id: flow_id.into(),
        }
    }
}

/// Caller identity attached to a message origin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// Message origin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    #[serde(default)]
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
}

/// Unit of transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: Header,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default)]
    pub body: Value,
}

impl Message {
    /// Create a message with an empty origin and body
    pub fn new(header: Header) -> Self {
        Self {
            header,
            origin: Origin::default(),
            body: Value::Null,
        }
    }

    /// Set the body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Set the origin
    pub fn with_origin(mut self, from: impl Into<String>, identity: Option<Identity>) -> Self {
        self.origin = Origin {
            from: from.into(),
            identity,
        };
        self
    }

    /// Correlation key
    pub fn flow_id(&self) -> &str {
        &self.header.flow_id
    }

    /// Parse a message from raw wire bytes
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Serialize to wire bytes
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
