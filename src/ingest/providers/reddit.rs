use metrics::{counter, histogram};
use serde::Deserialize;

use crate::ingest::types::{FetchError, MediaDescriptor, Submission, SubmissionSource};

const LISTING_BASE: &str = "https://www.reddit.com";

/// Feed provider for Reddit's public `new` listing endpoint.
///
/// Authentication/query mechanics beyond a User-Agent are out of scope for
/// the pipeline; the listing endpoint is enough to observe new submissions.
pub struct RedditSource {
    client: reqwest::Client,
    user_agent: String,
}

impl RedditSource {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            user_agent: user_agent.into(),
        }
    }

    fn listing_url(source: &str, limit: u32) -> String {
        format!("{LISTING_BASE}/r/{source}/new.json?limit={limit}&raw_json=1")
    }

    /// Decode one listing response body into submissions. Split out from the
    /// HTTP path so it is unit-testable against captured payloads.
    pub fn parse_listing(source: &str, body: &str) -> Result<Vec<Submission>, FetchError> {
        let t0 = std::time::Instant::now();
        let listing: Listing =
            serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

        let mut out = Vec::with_capacity(listing.data.children.len());
        for child in listing.data.children {
            out.push(child.data.into_submission(source));
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_submissions_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait::async_trait]
impl SubmissionSource for RedditSource {
    async fn list_new(&self, source: &str, limit: u32) -> Result<Vec<Submission>, FetchError> {
        let url = Self::listing_url(source, limit);
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::Auth(format!("{status} for r/{source}")));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Unavailable {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let body = resp.text().await?;
        Self::parse_listing(source, &body)
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}

// --- Listing envelope, only the fields the pipeline reads ---

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    /// Fullname, e.g. "t3_abc123".
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    is_self: bool,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    media: Option<PostMedia>,
    #[serde(default)]
    over_18: bool,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    #[serde(default)]
    permalink: String,
}

#[derive(Debug, Deserialize)]
struct PostMedia {
    #[serde(default)]
    reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Deserialize)]
struct RedditVideo {
    #[serde(default)]
    fallback_url: Option<String>,
    #[serde(default)]
    hls_url: Option<String>,
}

impl PostData {
    fn into_submission(self, source: &str) -> Submission {
        let media = match self.media.and_then(|m| m.reddit_video) {
            Some(rv) => MediaDescriptor::HostedVideo {
                fallback_url: rv.fallback_url,
                hls_url: rv.hls_url,
            },
            // `is_video` without a media object still leaves the v.redd.it
            // outbound link; the classifier recognizes that host.
            None => match self.url.filter(|u| !u.is_empty() && !self.is_self) {
                Some(url) => MediaDescriptor::Link(url),
                None => MediaDescriptor::None,
            },
        };

        let body = Some(self.selftext).filter(|s| !s.trim().is_empty());

        Submission {
            id: self.name,
            source: source.to_string(),
            title: self.title,
            author: self.author,
            body,
            media,
            score: self.score,
            num_comments: self.num_comments,
            created_at: self.created_utc.max(0.0) as u64,
            over_18: self.over_18,
            permalink: format!("{LISTING_BASE}{}", self.permalink),
        }
    }
}
