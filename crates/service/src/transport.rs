//! The chat side of the conversation.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use deckbg_core::UserId;

/// Opaque reference to a file the user uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef(pub String);

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of a transient status message, used to delete it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusHandle(pub u64);

#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch an uploaded file into `dest`.
    async fn download(&self, user: UserId, file: &FileRef, dest: &Path) -> anyhow::Result<()>;

    async fn send_text(&self, user: UserId, text: &str) -> anyhow::Result<()>;

    async fn send_status(&self, user: UserId, text: &str) -> anyhow::Result<StatusHandle>;

    async fn delete_status(&self, user: UserId, status: StatusHandle) -> anyhow::Result<()>;

    /// Deliver the file at `path`. The file is removed once this returns.
    async fn send_document(&self, user: UserId, path: &Path, caption: &str)
        -> anyhow::Result<()>;
}
