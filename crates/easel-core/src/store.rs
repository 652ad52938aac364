//! Persistence interfaces and a file-backed implementation.
//!
//! Message and canvas durability, and the binary content store for generated
//! files, sit behind [`PersistenceGateway`] and [`ContentStore`]. [`FileStore`]
//! implements both on the local filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{EaselError, Result};
use crate::types::ConversationMessage;

/// Durable storage for conversation messages and canvas documents.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Append one serialized message to a session's history.
    async fn create_message(&self, session_id: &str, role: &str, message: &str) -> Result<()>;

    /// Load a canvas document, or `None` if the canvas does not exist.
    async fn get_canvas_data(&self, canvas_id: &str) -> Result<Option<serde_json::Value>>;

    /// Replace a canvas document with its serialized form.
    async fn save_canvas_data(&self, canvas_id: &str, document: &str) -> Result<()>;
}

/// Append-only store for generated and uploaded files, addressed by file id.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Filesystem location of a stored file.
    fn path(&self, file_id: &str) -> Result<PathBuf>;

    async fn read(&self, file_id: &str) -> Result<Vec<u8>>;

    async fn write(&self, file_id: &str, bytes: &[u8]) -> Result<()>;
}

/// One line of a session's message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMessage {
    role: String,
    message: String,
    created_at: DateTime<Utc>,
}

/// Filesystem store.
///
/// Layout:
/// - `<base>/messages/<session_id>.jsonl`: one [`StoredMessage`] per line
/// - `<base>/canvases/<canvas_id>.json`: canvas document
/// - `<base>/files/<file_id>`: content store
pub struct FileStore {
    base: PathBuf,
}

impl FileStore {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    /// Default store location: `~/.easel/data/`
    pub fn default_path() -> PathBuf {
        crate::config::data_dir().join("data")
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn messages_dir(&self) -> PathBuf {
        self.base.join("messages")
    }

    fn canvases_dir(&self) -> PathBuf {
        self.base.join("canvases")
    }

    fn files_dir(&self) -> PathBuf {
        self.base.join("files")
    }

    fn message_log(&self, session_id: &str) -> Result<PathBuf> {
        Ok(self
            .messages_dir()
            .join(format!("{}.jsonl", checked_id(session_id)?)))
    }

    fn canvas_path(&self, canvas_id: &str) -> Result<PathBuf> {
        Ok(self
            .canvases_dir()
            .join(format!("{}.json", checked_id(canvas_id)?)))
    }

    /// All messages recorded for a session, in insertion order.
    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<ConversationMessage>> {
        let path = self.message_log(session_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut messages = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let stored: StoredMessage = serde_json::from_str(line)
                .map_err(|e| EaselError::Storage(format!("corrupt message line: {e}")))?;
            messages.push(serde_json::from_str(&stored.message)?);
        }
        Ok(messages)
    }
}

/// Identifiers become file names; reject anything that could escape the store.
fn checked_id(id: &str) -> Result<&str> {
    if id.is_empty() || id.contains(['/', '\\']) || id == "." || id.contains("..") {
        return Err(EaselError::Storage(format!("invalid identifier: {id:?}")));
    }
    Ok(id)
}

#[async_trait]
impl PersistenceGateway for FileStore {
    async fn create_message(&self, session_id: &str, role: &str, message: &str) -> Result<()> {
        let path = self.message_log(session_id)?;
        tokio::fs::create_dir_all(self.messages_dir()).await?;

        let line = serde_json::to_string(&StoredMessage {
            role: role.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        })?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        debug!(session_id, role, "Persisted message");
        Ok(())
    }

    async fn get_canvas_data(&self, canvas_id: &str) -> Result<Option<serde_json::Value>> {
        let path = self.canvas_path(canvas_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn save_canvas_data(&self, canvas_id: &str, document: &str) -> Result<()> {
        let path = self.canvas_path(canvas_id)?;
        tokio::fs::create_dir_all(self.canvases_dir()).await?;
        // Atomic write: write to temp then rename
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, document.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(canvas_id, bytes = document.len(), "Saved canvas");
        Ok(())
    }
}

#[async_trait]
impl ContentStore for FileStore {
    fn path(&self, file_id: &str) -> Result<PathBuf> {
        Ok(self.files_dir().join(checked_id(file_id)?))
    }

    async fn read(&self, file_id: &str) -> Result<Vec<u8>> {
        let path = ContentStore::path(self, file_id)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                EaselError::Storage(format!("file not found: {file_id}"))
            }
            _ => EaselError::Io(e),
        })
    }

    async fn write(&self, file_id: &str, bytes: &[u8]) -> Result<()> {
        let path = ContentStore::path(self, file_id)?;
        tokio::fs::create_dir_all(self.files_dir()).await?;
        tokio::fs::write(&path, bytes).await?;
        debug!(file_id, size = bytes.len(), "Stored file");
        Ok(())
    }
}
