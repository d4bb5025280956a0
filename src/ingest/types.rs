// src/ingest/types.rs
use thiserror::Error;

/// One submission fetched from a feed. Immutable once built; owned by the
/// poll cycle that fetched it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Submission {
    /// Stable feed identifier (`t3_`-prefixed fullname).
    pub id: String,
    /// Feed the submission came from (subreddit name, no `r/` prefix).
    pub source: String,
    pub title: String,
    pub author: String,
    /// Self-text body; `None` when the feed sent an empty string.
    pub body: Option<String>,
    pub media: MediaDescriptor,
    pub score: i64,
    pub num_comments: u64,
    /// Unix seconds.
    pub created_at: u64,
    pub over_18: bool,
    /// Absolute link to the submission on the feed site.
    pub permalink: String,
}

/// Raw media attachment as reported by the feed. Mapping the attachment to
/// a content category happens later, in `classify`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub enum MediaDescriptor {
    None,
    /// Platform-native video. `fallback_url` is a direct MP4 rendition,
    /// `hls_url` a playlist manifest.
    HostedVideo {
        fallback_url: Option<String>,
        hls_url: Option<String>,
    },
    /// Outbound link of a non-self submission.
    Link(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed rejected credentials: {0}")]
    Auth(String),
    #[error("feed rate limited")]
    RateLimited,
    #[error("feed unavailable ({status}): {body}")]
    Unavailable { status: u16, body: String },
    #[error("feed request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("feed listing did not decode: {0}")]
    Decode(String),
}

/// Capability seam over the feed API: list the newest submissions of one
/// named source. Implementations may return entries in any order; the
/// engine re-sorts oldest-first before processing.
#[async_trait::async_trait]
pub trait SubmissionSource: Send + Sync {
    async fn list_new(&self, source: &str, limit: u32) -> Result<Vec<Submission>, FetchError>;
    fn name(&self) -> &'static str;
}

impl Submission {
    /// Body text, treating whitespace-only bodies as absent.
    pub fn body_text(&self) -> Option<&str> {
        self.body.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}
