pub mod failed;
pub mod telegram;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::classify::ContentCategory;

/// Formatted notification, alive only between formatting and delivery.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    /// Markup-capable message text (already escaped where needed).
    pub text: String,
    pub category: ContentCategory,
    pub media: PayloadMedia,
}

#[derive(Debug, Clone)]
pub enum PayloadMedia {
    None,
    /// Remote image the sink renders by URL.
    PhotoUrl(String),
    /// Locally acquired video, uploaded as bytes. The file belongs to the
    /// current cycle step and is gone afterwards.
    VideoFile(PathBuf),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("sink rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    #[error("sink rejected payload: {reason}")]
    Rejected { reason: String },
    #[error("sink transport error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("payload media unreadable: {0}")]
    Io(#[from] std::io::Error),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {d:?})"),
        None => String::new(),
    }
}

impl DeliveryError {
    /// Retryable errors keep the submission uncommitted; terminal ones end
    /// its processing for good.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::RateLimited { .. } | DeliveryError::Network(_))
    }
}

/// Capability seam over the messaging sink.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_text(&self, dest: &str, text: &str) -> Result<(), DeliveryError>;
    async fn send_photo(&self, dest: &str, caption: &str, photo_url: &str)
        -> Result<(), DeliveryError>;
    async fn send_video(&self, dest: &str, caption: &str, video: &Path)
        -> Result<(), DeliveryError>;
}

/// Minimum-gap gate in front of the sink. Holding the lock across the wait
/// is the point: sends are serialized and spaced out no matter how many
/// callers race.
#[derive(Debug)]
pub struct SendGate {
    min_gap: Duration,
    last: Mutex<Option<Instant>>,
}

impl SendGate {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_gap {
                tokio::time::sleep(self.min_gap - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_spaces_consecutive_sends() {
        let gate = SendGate::new(Duration::from_millis(50));
        let t0 = Instant::now();
        gate.wait().await; // first send passes immediately
        gate.wait().await;
        assert!(t0.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn rate_limited_and_network_are_retryable() {
        assert!(DeliveryError::RateLimited { retry_after: None }.is_retryable());
        assert!(!DeliveryError::Rejected { reason: "bad chat".into() }.is_retryable());
    }
}
