//! Durable queue of notifications whose rich delivery failed terminally.
//!
//! Instead of losing the notification, the message is parked here and
//! retried as plain text (with a link back to the original post) on later
//! cycles. Three failed retries discard the entry.

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::NotificationSink;

pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedMessage {
    pub message: String,
    pub media_url: Option<String>,
    pub post_url: Option<String>,
    pub timestamp: String,
    pub retry_count: u32,
}

impl FailedMessage {
    pub fn new(message: String, media_url: Option<String>, post_url: Option<String>) -> Self {
        Self {
            message,
            media_url,
            post_url,
            timestamp: Utc::now().to_rfc3339(),
            retry_count: 0,
        }
    }
}

/// File-backed FIFO of failed messages (JSON array, rewritten on change).
pub struct FailedMessageStore {
    path: PathBuf,
    entries: Mutex<Vec<FailedMessage>>,
}

impl FailedMessageStore {
    /// Load the persisted queue. Unlike dedup state, a corrupt queue is not
    /// fatal — worst case some fallback messages are lost, which is the
    /// queue's own failure mode anyway.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "failed-message queue unreadable, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading failed-message queue at {}", path.display()))
            }
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub async fn push(&self, msg: FailedMessage) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        entries.push(msg);
        let count = entries.len();
        self.persist(&entries).await?;
        tracing::info!(queued = count, "notification parked for plain-text retry");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Retry every queued entry as plain text. Successes and exhausted
    /// entries leave the queue; fresh failures stay with a bumped count.
    /// Returns how many entries were delivered.
    pub async fn drain(&self, sink: &dyn NotificationSink, dest: &str) -> usize {
        let snapshot = self.entries.lock().await.clone();
        if snapshot.is_empty() {
            return 0;
        }
        tracing::info!(queued = snapshot.len(), "retrying failed messages");

        let mut kept = Vec::new();
        let mut delivered = 0usize;
        for mut entry in snapshot {
            let mut text = entry.message.clone();
            if let Some(url) = &entry.post_url {
                text.push_str(&format!("\n\n🔗 [View original post]({url})"));
            }

            match sink.send_text(dest, &text).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    entry.retry_count += 1;
                    if entry.retry_count >= MAX_RETRIES {
                        tracing::warn!(error = %e, retries = entry.retry_count, "failed message discarded");
                    } else {
                        tracing::warn!(error = %e, retries = entry.retry_count, "failed message kept for another retry");
                        kept.push(entry);
                    }
                }
            }
        }

        let mut entries = self.entries.lock().await;
        *entries = kept;
        if let Err(e) = self.persist(&entries).await {
            tracing::error!(error = %e, "persisting failed-message queue");
        }
        delivered
    }

    async fn persist(&self, entries: &[FailedMessage]) -> anyhow::Result<()> {
        let raw = serde_json::to_vec_pretty(entries)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed.json");

        let store = FailedMessageStore::open(&path).await.unwrap();
        store
            .push(FailedMessage::new("hello".into(), None, Some("https://r/p".into())))
            .await
            .unwrap();

        let reopened = FailedMessageStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 1);
    }

    #[tokio::test]
    async fn corrupt_queue_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed.json");
        tokio::fs::write(&path, "not json").await.unwrap();
        let store = FailedMessageStore::open(&path).await.unwrap();
        assert!(store.is_empty().await);
    }
}
