use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use super::{DeliveryError, NotificationSink, SendGate};

const API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API sink.
///
/// Text and photos go out as JSON calls (photos by remote URL); video is
/// uploaded as multipart bytes, since the sink does not reliably render
/// hosted-video URLs. Every send first passes the shared [`SendGate`].
pub struct TelegramNotifier {
    token: String,
    client: Client,
    gate: SendGate,
    timeout: Duration,
    upload_timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(token: String) -> Self {
        Self {
            token,
            client: Client::new(),
            gate: SendGate::new(Duration::from_secs(2)),
            timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_min_send_gap(mut self, gap: Duration) -> Self {
        self.gate = SendGate::new(gap);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{method}", self.token)
    }

    async fn check(resp: reqwest::Response) -> Result<(), DeliveryError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        let api: ApiError = serde_json::from_str(&body).unwrap_or_default();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DeliveryError::RateLimited {
                retry_after: api
                    .parameters
                    .and_then(|p| p.retry_after)
                    .map(Duration::from_secs),
            });
        }

        Err(DeliveryError::Rejected {
            reason: api
                .description
                .unwrap_or_else(|| format!("http status {status}")),
        })
    }
}

#[async_trait::async_trait]
impl NotificationSink for TelegramNotifier {
    async fn send_text(&self, dest: &str, text: &str) -> Result<(), DeliveryError> {
        self.gate.wait().await;
        let resp = self
            .client
            .post(self.endpoint("sendMessage"))
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "chat_id": dest,
                "text": text,
                "parse_mode": "Markdown",
                "disable_web_page_preview": false,
            }))
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn send_photo(
        &self,
        dest: &str,
        caption: &str,
        photo_url: &str,
    ) -> Result<(), DeliveryError> {
        self.gate.wait().await;
        let resp = self
            .client
            .post(self.endpoint("sendPhoto"))
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "chat_id": dest,
                "photo": photo_url,
                "caption": caption,
                "parse_mode": "Markdown",
            }))
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn send_video(
        &self,
        dest: &str,
        caption: &str,
        video: &Path,
    ) -> Result<(), DeliveryError> {
        self.gate.wait().await;
        let bytes = tokio::fs::read(video).await?;
        tracing::debug!(bytes = bytes.len(), "uploading video to sink");

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("video.mp4")
            .mime_str("video/mp4")
            .map_err(DeliveryError::Network)?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", dest.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "Markdown")
            .part("video", part);

        let resp = self
            .client
            .post(self.endpoint("sendVideo"))
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await?;
        Self::check(resp).await
    }
}

// --- Bot API error envelope (only what the retry policy reads) ---

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ApiParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}
