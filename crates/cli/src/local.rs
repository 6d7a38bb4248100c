//! Local-filesystem transport for `deckbg serve`.
//!
//! Uploads are file paths on this machine. Replies go to stdout as JSON
//! lines and delivered decks are copied into an outbox directory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use deckbg_core::UserId;
use deckbg_service::{FileRef, StatusHandle, Transport};
use serde::Serialize;

/// One line written to stdout.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    Text { user: UserId, text: String },
    Status { user: UserId, id: u64, text: String },
    StatusDeleted { user: UserId, id: u64 },
    Document { user: UserId, path: PathBuf, caption: String },
}

pub struct LocalTransport {
    outbox: PathBuf,
    counter: AtomicU64,
}

impl LocalTransport {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
            counter: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn emit(&self, reply: &Reply) -> anyhow::Result<()> {
        let line = serde_json::to_string(reply)?;
        println!("{}", line);
        Ok(())
    }

    /// Where the next document for `user` is delivered.
    fn outbox_path(&self, user: UserId) -> PathBuf {
        self.outbox
            .join(format!("deck_{}_{}.pptx", user, self.next_id()))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn download(&self, _user: UserId, file: &FileRef, dest: &Path) -> anyhow::Result<()> {
        tokio::fs::copy(&file.0, dest)
            .await
            .with_context(|| format!("Failed to copy {} to {}", file, dest.display()))?;
        Ok(())
    }

    async fn send_text(&self, user: UserId, text: &str) -> anyhow::Result<()> {
        self.emit(&Reply::Text {
            user,
            text: text.to_string(),
        })
    }

    async fn send_status(&self, user: UserId, text: &str) -> anyhow::Result<StatusHandle> {
        let id = self.next_id();
        self.emit(&Reply::Status {
            user,
            id,
            text: text.to_string(),
        })?;
        Ok(StatusHandle(id))
    }

    async fn delete_status(&self, user: UserId, status: StatusHandle) -> anyhow::Result<()> {
        self.emit(&Reply::StatusDeleted { user, id: status.0 })
    }

    async fn send_document(
        &self,
        user: UserId,
        path: &Path,
        caption: &str,
    ) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.outbox)
            .await
            .with_context(|| format!("Failed to create outbox {}", self.outbox.display()))?;

        let delivered = self.outbox_path(user);
        tokio::fs::copy(path, &delivered)
            .await
            .with_context(|| format!("Failed to deliver {}", path.display()))?;

        self.emit(&Reply::Document {
            user,
            path: delivered,
            caption: caption.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_lines() {
        let line = serde_json::to_string(&Reply::StatusDeleted {
            user: UserId(5),
            id: 2,
        })
        .unwrap();
        assert_eq!(line, r#"{"kind":"status_deleted","user":5,"id":2}"#);
    }

    #[tokio::test]
    async fn test_download_and_deliver() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("upload.pptx");
        std::fs::write(&upload, b"deck bytes").unwrap();

        let transport = LocalTransport::new(dir.path().join("outbox"));
        let dest = dir.path().join("input_1.pptx");
        transport
            .download(
                UserId(1),
                &FileRef(upload.to_string_lossy().into_owned()),
                &dest,
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"deck bytes");

        transport
            .send_document(UserId(1), &dest, "done")
            .await
            .unwrap();
        let delivered: Vec<_> = std::fs::read_dir(dir.path().join("outbox"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(delivered.len(), 1);
        assert_eq!(std::fs::read(&delivered[0]).unwrap(), b"deck bytes");
    }

    #[tokio::test]
    async fn test_missing_upload_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());

        let result = transport
            .download(
                UserId(1),
                &FileRef("/definitely/not/here.pptx".to_string()),
                &dir.path().join("x.pptx"),
            )
            .await;

        assert!(result.is_err());
        assert!(!dir.path().join("x.pptx").exists());
    }
}
