//! Shared fakes for integration tests: a scriptable feed source and a
//! recording sink.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use reddit_to_telegram::config::SourceConfig;
use reddit_to_telegram::ingest::types::{
    FetchError, MediaDescriptor, Submission, SubmissionSource,
};
use reddit_to_telegram::notify::{DeliveryError, NotificationSink};

pub fn text_submission(id: &str, source: &str, title: &str, created_at: u64) -> Submission {
    Submission {
        id: id.into(),
        source: source.into(),
        title: title.into(),
        author: "tester".into(),
        body: Some("hello".into()),
        media: MediaDescriptor::None,
        score: 1,
        num_comments: 0,
        created_at,
        over_18: false,
        permalink: format!("https://www.reddit.com/r/{source}/comments/{id}/"),
    }
}

pub fn media_submission(id: &str, source: &str, media: MediaDescriptor, created_at: u64) -> Submission {
    Submission {
        media,
        ..text_submission(id, source, "some title", created_at)
    }
}

pub fn source_cfg(name: &str, fetch_limit: u32) -> SourceConfig {
    SourceConfig {
        name: name.into(),
        fetch_limit,
        poll_interval_secs: None,
    }
}

/// Feed fake: fixed batch per source name, optional per-source failure.
#[derive(Default)]
pub struct FakeSource {
    batches: Mutex<HashMap<String, Vec<Submission>>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch(self, source: &str, batch: Vec<Submission>) -> Self {
        self.batches.lock().unwrap().insert(source.into(), batch);
        self
    }

    pub fn with_failing(self, source: &str) -> Self {
        self.failing.lock().unwrap().insert(source.into());
        self
    }
}

#[async_trait::async_trait]
impl SubmissionSource for FakeSource {
    async fn list_new(&self, source: &str, limit: u32) -> Result<Vec<Submission>, FetchError> {
        if self.failing.lock().unwrap().contains(source) {
            return Err(FetchError::Unavailable {
                status: 503,
                body: "scripted outage".into(),
            });
        }
        let mut batch = self
            .batches
            .lock()
            .unwrap()
            .get(source)
            .cloned()
            .unwrap_or_default();
        batch.truncate(limit as usize);
        Ok(batch)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Text(String),
    Photo { caption: String, url: String },
    Video { caption: String },
}

/// What the sink should answer next; the queue drains one entry per send,
/// then everything succeeds.
pub enum Scripted {
    Ok,
    RateLimited(Option<u64>),
    Rejected(&'static str),
}

impl Scripted {
    fn into_result(self) -> Result<(), DeliveryError> {
        match self {
            Scripted::Ok => Ok(()),
            Scripted::RateLimited(secs) => Err(DeliveryError::RateLimited {
                retry_after: secs.map(Duration::from_secs),
            }),
            Scripted::Rejected(reason) => Err(DeliveryError::Rejected {
                reason: reason.to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub calls: Mutex<Vec<SinkCall>>,
    script: Mutex<VecDeque<Scripted>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(results: Vec<Scripted>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(results.into()),
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self) -> Result<(), DeliveryError> {
        match self.script.lock().unwrap().pop_front() {
            Some(s) => s.into_result(),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn send_text(&self, _dest: &str, text: &str) -> Result<(), DeliveryError> {
        self.calls.lock().unwrap().push(SinkCall::Text(text.to_string()));
        self.next()
    }

    async fn send_photo(
        &self,
        _dest: &str,
        caption: &str,
        photo_url: &str,
    ) -> Result<(), DeliveryError> {
        self.calls.lock().unwrap().push(SinkCall::Photo {
            caption: caption.to_string(),
            url: photo_url.to_string(),
        });
        self.next()
    }

    async fn send_video(
        &self,
        _dest: &str,
        caption: &str,
        _video: &Path,
    ) -> Result<(), DeliveryError> {
        self.calls.lock().unwrap().push(SinkCall::Video {
            caption: caption.to_string(),
        });
        self.next()
    }
}
