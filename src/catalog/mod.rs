//! Topic catalog
//!
//! Maps logical topic names declared in a YAML file to concrete broker topic
//! names. Each entry may be overridden through a [`KeyValueSource`] under the
//! key `{group.path}/{name}`; otherwise its `default_value` is used.
//!
//! ```yaml
//! kafka:
//!   topicsGroups:
//!     - path: app/topics
//!       topics:
//!         - name: results
//!           default_value: results.v1
//! ```

mod document;
mod error;
mod kv;

pub use document::{CatalogDocument, KafkaSection, TopicEntry, TopicsGroup};
pub use error::{CatalogError, CatalogResult};
pub use kv::{decode_value, key_value_source, ConsulKv, KeyValueSource, NoOverrides, StaticKv};

use serde_json::Value;
use std::path::{Path, PathBuf};

/// A loaded catalog file
#[derive(Debug, Clone)]
pub struct TopicCatalog {
    path: PathBuf,
    document: CatalogDocument,
}

impl TopicCatalog {
    /// Read and parse a catalog file
    pub async fn load(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| CatalogError::Read {
                path: path.clone(),
                source,
            })?;
        let document = serde_yaml::from_str(&raw).map_err(|e| CatalogError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self { path, document })
    }

    pub fn from_document(document: CatalogDocument) -> Self {
        Self {
            path: PathBuf::new(),
            document,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &CatalogDocument {
        &self.document
    }

    /// Concrete names of every entry, in file order; unresolved entries are omitted
    pub async fn resolve_all(&self, kv: &dyn KeyValueSource) -> Vec<String> {
        let mut topics = Vec::new();
        for (key, entry) in self.document.entries() {
            if let Some(topic) = resolve_entry(&key, entry, kv).await {
                topics.push(topic);
            }
        }
        topics
    }

    /// Concrete name of one logical topic
    pub async fn resolve(&self, name: &str, kv: &dyn KeyValueSource) -> Option<String> {
        let (key, entry) = self.document.find(name)?;
        resolve_entry(&key, entry, kv).await
    }
}

/// Resolve every topic declared in the catalog file
///
/// A missing or invalid file is logged and yields an empty list.
pub async fn get_topics_list(path: impl AsRef<Path>, kv: &dyn KeyValueSource) -> Vec<String> {
    match TopicCatalog::load(path).await {
        Ok(catalog) => catalog.resolve_all(kv).await,
        Err(e) => {
            tracing::error!(error = %e, "Topic catalog unavailable");
            Vec::new()
        }
    }
}

/// Resolve one logical topic; `None` when the file or the entry is missing
pub async fn get_topic(
    path: impl AsRef<Path>,
    name: &str,
    kv: &dyn KeyValueSource,
) -> Option<String> {
    match TopicCatalog::load(path).await {
        Ok(catalog) => catalog.resolve(name, kv).await,
        Err(e) => {
            tracing::error!(error = %e, name = %name, "Topic catalog unavailable");
            None
        }
    }
}

async fn resolve_entry(key: &str, entry: &TopicEntry, kv: &dyn KeyValueSource) -> Option<String> {
    resolve_key(key, entry.default_value.as_deref(), kv).await
}

/// Topic name stored under `key`, else the trimmed non-empty `default`
pub async fn resolve_key(
    key: &str,
    default: Option<&str>,
    kv: &dyn KeyValueSource,
) -> Option<String> {
    match kv.get(key).await {
        Ok(Some(value)) => match topic_name(&value) {
            Some(topic) => return Some(topic),
            None => tracing::warn!(key = %key, "Override is not a topic name, using default"),
        },
        Ok(None) => {}
        Err(e) => tracing::warn!(key = %key, error = %e, "Override lookup failed, using default"),
    }

    default
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn topic_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
