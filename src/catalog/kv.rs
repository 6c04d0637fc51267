//! Read-only key-value sources for topic overrides

use crate::catalog::error::{CatalogError, CatalogResult};
use crate::config::ConsulConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Lookup of configuration values by key
#[async_trait]
pub trait KeyValueSource: Send + Sync {
    /// Value stored at `key`; objects and arrays come back decoded, everything
    /// else as the raw string
    async fn get(&self, key: &str) -> CatalogResult<Option<Value>>;
}

/// Decode a stored string the way configuration values are interpreted:
/// JSON objects and arrays are structured, anything else stays a string
pub fn decode_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

/// Source without any overrides; every topic resolves to its default
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverrides;

#[async_trait]
impl KeyValueSource for NoOverrides {
    async fn get(&self, _key: &str) -> CatalogResult<Option<Value>> {
        Ok(None)
    }
}

/// In-memory key/value list
#[derive(Debug, Clone, Default)]
pub struct StaticKv {
    values: HashMap<String, String>,
}

impl StaticKv {
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

#[async_trait]
impl KeyValueSource for StaticKv {
    async fn get(&self, key: &str) -> CatalogResult<Option<Value>> {
        Ok(self.values.get(key).map(|raw| decode_value(raw)))
    }
}

/// Consul when enabled, otherwise no overrides
pub fn key_value_source(config: &ConsulConfig) -> CatalogResult<Arc<dyn KeyValueSource>> {
    if config.enabled {
        tracing::info!(url = %config.base_url(), "Resolving topic overrides through Consul");
        Ok(Arc::new(ConsulKv::from_config(config)?))
    } else {
        Ok(Arc::new(NoOverrides))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulPair {
    key: String,
    value: Option<String>,
}

/// Consul HTTP KV API
#[derive(Debug, Clone)]
pub struct ConsulKv {
    client: Client,
    base_url: String,
}

impl ConsulKv {
    /// Create a source for the agent at `base_url` (e.g. `http://localhost:8500`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> CatalogResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Lookup {
                key: base_url.clone(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &ConsulConfig) -> CatalogResult<Self> {
        Self::new(config.base_url(), Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl KeyValueSource for ConsulKv {
    async fn get(&self, key: &str) -> CatalogResult<Option<Value>> {
        let url = format!("{}/v1/kv/{}", self.base_url, key.trim_start_matches('/'));
        let lookup_err = |reason: String| CatalogError::Lookup {
            key: key.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .query(&[("recurse", "true")])
            .send()
            .await
            .map_err(|e| lookup_err(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| lookup_err(e.to_string()))?;
        let pairs: Vec<ConsulPair> = response
            .json()
            .await
            .map_err(|e| lookup_err(e.to_string()))?;

        // recursive lookups also return children; prefer the exact key
        let index = pairs.iter().position(|pair| pair.key == key).unwrap_or(0);
        let Some(encoded) = pairs.into_iter().nth(index).and_then(|pair| pair.value) else {
            return Ok(None);
        };

        let decoded = general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| CatalogError::Decode {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        let raw = String::from_utf8(decoded).map_err(|e| CatalogError::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(key = %key, "Consul value loaded");
        Ok(Some(decode_value(&raw)))
    }
}
