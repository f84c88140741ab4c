//! Durable conversation history.
//!
//! The whole conversation lives in one JSON document that is rewritten on
//! every save. There is no incremental update and no schema version: a
//! document that fails to parse is treated the same as a missing one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::state::Message;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Previously saved conversation, or empty when there is nothing usable
    async fn load(&self) -> Vec<Message>;

    /// Replace the stored conversation with `messages`
    async fn save(&self, messages: &[Message]) -> Result<()>;

    /// Remove the stored conversation entirely
    async fn clear(&self) -> Result<()>;
}

/// History kept as a single JSON array on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "messages.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn load(&self) -> Vec<Message> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read history");
                return Vec::new();
            }
        };

        if content.trim().is_empty() {
            return Vec::new();
        }

        match serde_json::from_str::<Vec<Message>>(&content) {
            Ok(messages) => {
                debug!(count = messages.len(), "loaded history");
                messages
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable history");
                Vec::new()
            }
        }
    }

    async fn save(&self, messages: &[Message]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string(messages)?;

        // Write beside the target and rename over it so a crash never leaves half a file
        let tmp = self.tmp_path();
        fs::write(&tmp, content).await?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(Error::storage(format!(
                "could not replace {}: {}",
                self.path.display(),
                e
            )));
        }

        debug!(count = messages.len(), "saved history");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
