//! File-backed append-only store keyed by (provider, topic, flow id)
//!
//! Layout: `{root}/{provider}/{topic}/{flow_id}/{unique}.msg`, one JSON
//! message per file. Writers never share a file, so no locking is needed.
//! Messages are stored and returned as received JSON, so fields unknown to
//! [`Message`](crate::messaging::Message) survive the round trip. An empty
//! flow id is stored under the reserved [`EMPTY_FLOW_SEGMENT`] directory.

use crate::messaging::Provider;
use crate::replay::error::{ReplayError, ReplayResult};
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const MESSAGE_EXTENSION: &str = "msg";

/// Directory name holding messages whose flow id is empty
pub const EMPTY_FLOW_SEGMENT: &str = "_";

#[derive(Debug, Clone)]
pub struct ReplayStore {
    root: PathBuf,
}

impl ReplayStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the messages of one flow
    pub fn flow_dir(&self, provider: Provider, topic: &str, flow_id: &str) -> ReplayResult<PathBuf> {
        let segment = if flow_id.is_empty() {
            EMPTY_FLOW_SEGMENT
        } else {
            validate_segment("flow id", flow_id)?
        };
        Ok(self.topic_dir(provider, topic)?.join(segment))
    }

    fn topic_dir(&self, provider: Provider, topic: &str) -> ReplayResult<PathBuf> {
        Ok(self
            .root
            .join(provider.as_str())
            .join(validate_segment("topic", topic)?))
    }

    /// Persist a message under a fresh file name; existing files are never touched
    pub async fn append<T>(
        &self,
        provider: Provider,
        topic: &str,
        flow_id: &str,
        message: &T,
    ) -> ReplayResult<PathBuf>
    where
        T: Serialize + ?Sized,
    {
        let dir = self.flow_dir(provider, topic, flow_id)?;
        fs::create_dir_all(&dir).await.map_err(ReplayError::io(&dir))?;

        let bytes = serde_json::to_vec(message)?;
        let path = dir.join(format!("{}.{}", Uuid::new_v4(), MESSAGE_EXTENSION));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(ReplayError::io(&path))?;
        file.write_all(&bytes).await.map_err(ReplayError::io(&path))?;
        file.flush().await.map_err(ReplayError::io(&path))?;

        tracing::debug!(
            provider = %provider,
            topic = %topic,
            flow_id = %flow_id,
            path = %path.display(),
            "Message stored"
        );
        Ok(path)
    }

    /// Every readable message of a flow, in directory order
    pub async fn messages(
        &self,
        topic: &str,
        flow_id: &str,
        provider: Provider,
    ) -> ReplayResult<Vec<Value>> {
        let dir = self.flow_dir(provider, topic, flow_id)?;
        let Some(mut entries) = read_dir_if_present(&dir).await? else {
            tracing::info!(provider = %provider, topic = %topic, flow_id = %flow_id, "No messages stored for flow");
            return Ok(Vec::new());
        };

        let mut messages = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(ReplayError::io(&dir))? {
            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }

            let raw = match fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Stored message unreadable");
                    continue;
                }
            };
            match serde_json::from_slice::<Value>(&raw) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::info!(path = %path.display(), error = %e, "Stored message could not be parsed");
                }
            }
        }

        Ok(messages)
    }

    /// Flow ids with at least one directory under the topic, sorted
    pub async fn flows(&self, provider: Provider, topic: &str) -> ReplayResult<Vec<String>> {
        let dir = self.topic_dir(provider, topic)?;
        let Some(mut entries) = read_dir_if_present(&dir).await? else {
            return Ok(Vec::new());
        };

        let mut flows = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(ReplayError::io(&dir))? {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if is_dir {
                let name = entry.file_name().to_string_lossy().into_owned();
                flows.push(if name == EMPTY_FLOW_SEGMENT {
                    String::new()
                } else {
                    name
                });
            }
        }
        flows.sort();
        Ok(flows)
    }
}

async fn read_dir_if_present(dir: &Path) -> ReplayResult<Option<fs::ReadDir>> {
    match fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ReplayError::io(dir)(e)),
    }
    fs::read_dir(dir).await.map(Some).map_err(ReplayError::io(dir))
}

fn validate_segment<'a>(kind: &'static str, value: &'a str) -> ReplayResult<&'a str> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value == "." || value == ".." {
        Some("must not be a relative path component")
    } else if value.contains(['/', '\\', '\0']) {
        Some("must not contain path separators")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ReplayError::InvalidKey {
            kind,
            value: value.to_string(),
            reason,
        }),
        None => Ok(value),
    }
}
