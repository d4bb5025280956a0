//! # Poll Cycle Engine
//!
//! Drives the recurring loop: fetch due sources → drop already-delivered
//! submissions → per submission: classify, acquire media, format, deliver,
//! commit. The dedup commit is the last step of a submission and only
//! happens on a terminal outcome, so a crash mid-send costs at most one
//! duplicate notification, never a silently lost submission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::classify::{classify, ContentCategory, MediaRef};
use crate::config::SourceConfig;
use crate::dedup::DedupStore;
use crate::format::MessageFormatter;
use crate::ingest::types::{Submission, SubmissionSource};
use crate::ingest::{ensure_metrics_described, sort_oldest_first};
use crate::media::{AcquiredMedia, MediaAcquirer, MediaError};
use crate::notify::failed::{FailedMessage, FailedMessageStore};
use crate::notify::{DeliveryError, NotificationPayload, NotificationSink, PayloadMedia};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sink destination (chat id).
    pub destination: String,
    /// Base interval between poll cycles.
    pub poll_interval: Duration,
    pub sources: Vec<SourceConfig>,
    /// Forward submissions that classified as plain text. Off by default;
    /// text-only posts are committed without a send.
    pub send_text_only_posts: bool,
    /// Delivery attempts per submission before deferring to the next cycle.
    pub max_delivery_attempts: u32,
    /// First backoff delay; doubles per retry unless the sink names one.
    pub retry_base: Duration,
}

/// Terminal decision for one submission within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Sink accepted the notification. Commit.
    Delivered,
    /// Sink rejected it for good. Commit, don't retry forever.
    Rejected,
    /// Retry budget exhausted on a retryable failure. No commit; the next
    /// cycle sees the submission again.
    Deferred,
    /// Text-only post with forwarding disabled. Commit without a send.
    SkippedTextOnly,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    pub fetched: usize,
    pub already_seen: usize,
    pub delivered: usize,
    pub rejected: usize,
    pub deferred: usize,
    pub skipped: usize,
}

pub struct Engine {
    cfg: EngineConfig,
    source: Arc<dyn SubmissionSource>,
    dedup: Arc<dyn DedupStore>,
    sink: Arc<dyn NotificationSink>,
    acquirer: MediaAcquirer,
    formatter: MessageFormatter,
    failed: Arc<FailedMessageStore>,
}

impl Engine {
    pub fn new(
        cfg: EngineConfig,
        source: Arc<dyn SubmissionSource>,
        dedup: Arc<dyn DedupStore>,
        sink: Arc<dyn NotificationSink>,
        acquirer: MediaAcquirer,
        formatter: MessageFormatter,
        failed: Arc<FailedMessageStore>,
    ) -> Self {
        Self {
            cfg,
            source,
            dedup,
            sink,
            acquirer,
            formatter,
            failed,
        }
    }

    /// Loop until the shutdown signal flips. The sleep is interruptible;
    /// an in-flight submission step always finishes first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let names: Vec<&str> = self.cfg.sources.iter().map(|s| s.name.as_str()).collect();
        tracing::info!(
            sources = ?names,
            interval_secs = self.cfg.poll_interval.as_secs(),
            "engine started"
        );

        // per-source next-due times, for cadence overrides
        let mut next_due: HashMap<String, tokio::time::Instant> = HashMap::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = tokio::time::Instant::now();
            let due: Vec<SourceConfig> = self
                .cfg
                .sources
                .iter()
                .filter(|sc| next_due.get(&sc.name).map_or(true, |t| *t <= now))
                .cloned()
                .collect();

            let stats = self.run_cycle_for(&due, Some(&shutdown)).await;
            for sc in &due {
                let interval = sc
                    .poll_interval_secs
                    .map(Duration::from_secs)
                    .unwrap_or(self.cfg.poll_interval);
                next_due.insert(sc.name.clone(), now + interval);
            }

            let drained = self
                .failed
                .drain(self.sink.as_ref(), &self.cfg.destination)
                .await;

            tracing::info!(
                fetched = stats.fetched,
                already_seen = stats.already_seen,
                delivered = stats.delivered,
                rejected = stats.rejected,
                deferred = stats.deferred,
                skipped = stats.skipped,
                failed_drained = drained,
                "poll cycle complete"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.cfg.poll_interval) => {}
                _ = shutdown.changed() => {
                    tracing::info!("shutdown signal received");
                    break;
                }
            }
        }

        tracing::info!("engine stopped");
    }

    /// One full cycle over every configured source. Exposed for tests and
    /// one-shot runs.
    pub async fn run_cycle(&self) -> CycleStats {
        self.run_cycle_for(&self.cfg.sources, None).await
    }

    async fn run_cycle_for(
        &self,
        due: &[SourceConfig],
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> CycleStats {
        ensure_metrics_described();
        let mut stats = CycleStats::default();

        for (sc, batch) in self.fetch_due(due).await {
            stats.fetched += batch.len();
            for sub in sort_oldest_first(batch) {
                // the in-flight step finishes; anything after it waits for
                // the next process start
                if shutdown.is_some_and(|s| *s.borrow()) {
                    tracing::info!("shutdown during cycle, remaining submissions left unprocessed");
                    return stats;
                }
                if self.dedup.contains(&sub.id).await {
                    counter!("ingest_seen_total").increment(1);
                    stats.already_seen += 1;
                    continue;
                }

                let outcome = self.process_submission(&sub).await;
                match outcome {
                    Outcome::Delivered => stats.delivered += 1,
                    Outcome::Rejected => stats.rejected += 1,
                    Outcome::Deferred => stats.deferred += 1,
                    Outcome::SkippedTextOnly => stats.skipped += 1,
                }

                if outcome != Outcome::Deferred {
                    if let Err(e) = self.dedup.commit(&sub.id).await {
                        // not durable → not committed; the submission will
                        // surface again next cycle
                        tracing::error!(
                            source = %sc.name,
                            id = %sub.id,
                            error = %e,
                            "dedup commit failed, submission retries next cycle"
                        );
                    }
                }
            }
        }

        gauge!("poll_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
        stats
    }

    /// Fetch every due source concurrently; a failing source is logged and
    /// skipped without touching the others. Results come back in config
    /// order so cross-cycle delivery order stays stable.
    async fn fetch_due(&self, due: &[SourceConfig]) -> Vec<(SourceConfig, Vec<Submission>)> {
        let mut set = JoinSet::new();
        for sc in due {
            let source = Arc::clone(&self.source);
            let sc = sc.clone();
            set.spawn(async move {
                let res = source.list_new(&sc.name, sc.fetch_limit).await;
                (sc, res)
            });
        }

        let mut by_name = HashMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((sc, Ok(batch))) => {
                    tracing::debug!(source = %sc.name, count = batch.len(), "listing fetched");
                    by_name.insert(sc.name.clone(), batch);
                }
                Ok((sc, Err(e))) => {
                    counter!("ingest_fetch_errors_total").increment(1);
                    tracing::warn!(source = %sc.name, error = %e, "source fetch failed, skipped this cycle");
                }
                Err(e) => {
                    tracing::error!(error = %e, "fetch task failed to join");
                }
            }
        }

        due.iter()
            .filter_map(|sc| by_name.remove(&sc.name).map(|b| (sc.clone(), b)))
            .collect()
    }

    async fn process_submission(&self, sub: &Submission) -> Outcome {
        let class = classify(sub);
        tracing::info!(
            source = %sub.source,
            id = %sub.id,
            category = class.category.as_str(),
            over_18 = sub.over_18,
            "new submission"
        );

        if class.category == ContentCategory::Text && !self.cfg.send_text_only_posts {
            tracing::debug!(id = %sub.id, "text-only post skipped");
            return Outcome::SkippedTextOnly;
        }

        // hosted video is the only category that needs local acquisition
        let mut acquired: Option<AcquiredMedia> = None;
        let mut degrade_note: Option<&str> = None;
        if class.category == ContentCategory::HostedVideo {
            match class.media.as_ref() {
                Some(MediaRef::HostedManifest(url)) => match self.acquirer.acquire(url).await {
                    Ok(m) => acquired = Some(m),
                    Err(e) => {
                        counter!("media_acquire_failures_total").increment(1);
                        tracing::warn!(
                            source = %sub.source,
                            id = %sub.id,
                            error = %e,
                            "media acquisition failed, degrading to link payload"
                        );
                        degrade_note = Some(acquire_note(&e));
                    }
                },
                _ => degrade_note = Some("Video could not be retrieved"),
            }
        }

        let mut text = self.formatter.render(sub, &class);
        if let Some(note) = degrade_note {
            text = self.formatter.degraded(&text, sub, note);
        }

        let media = match (&acquired, &class) {
            (Some(m), _) => PayloadMedia::VideoFile(m.path().to_path_buf()),
            (None, c) if c.category == ContentCategory::Image => match &c.media {
                Some(r) => PayloadMedia::PhotoUrl(r.url().to_string()),
                None => PayloadMedia::None,
            },
            _ => PayloadMedia::None,
        };

        let payload = NotificationPayload {
            text,
            category: class.category,
            media,
        };

        self.deliver(sub, payload).await
        // `acquired` drops here; the transient video file is gone
    }

    /// Send with bounded exponential backoff on retryable failures. A
    /// terminal rejection of a rich payload gets one degraded plain-text
    /// attempt, then the message is parked for later retry.
    async fn deliver(&self, sub: &Submission, payload: NotificationPayload) -> Outcome {
        let dest = &self.cfg.destination;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let res = match &payload.media {
                PayloadMedia::None => self.sink.send_text(dest, &payload.text).await,
                PayloadMedia::PhotoUrl(url) => {
                    self.sink.send_photo(dest, &payload.text, url).await
                }
                PayloadMedia::VideoFile(path) => {
                    self.sink.send_video(dest, &payload.text, path).await
                }
            };

            match res {
                Ok(()) => {
                    counter!("deliver_sent_total").increment(1);
                    tracing::info!(
                        id = %sub.id,
                        category = payload.category.as_str(),
                        "notification delivered"
                    );
                    return Outcome::Delivered;
                }
                Err(e) if e.is_retryable() && attempt < self.cfg.max_delivery_attempts => {
                    counter!("deliver_retries_total").increment(1);
                    let delay = match &e {
                        DeliveryError::RateLimited { retry_after: Some(d) } => *d,
                        _ => self.cfg.retry_base.saturating_mul(1u32 << (attempt - 1)),
                    };
                    tracing::warn!(
                        id = %sub.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "delivery failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        source = %sub.source,
                        id = %sub.id,
                        attempts = attempt,
                        error = %e,
                        "delivery retries exhausted, deferring to next cycle"
                    );
                    return Outcome::Deferred;
                }
                Err(e) => {
                    counter!("deliver_rejected_total").increment(1);
                    tracing::warn!(
                        source = %sub.source,
                        id = %sub.id,
                        error = %e,
                        "sink rejected notification"
                    );
                    if !matches!(payload.media, PayloadMedia::None) {
                        return self.deliver_degraded(sub, &payload).await;
                    }
                    return Outcome::Rejected;
                }
            }
        }
    }

    /// Rich payload bounced: try once as plain text with the original-post
    /// link; if even that fails, park the message in the failed queue.
    /// Either way the submission is terminal and gets committed.
    async fn deliver_degraded(&self, sub: &Submission, payload: &NotificationPayload) -> Outcome {
        let note = match payload.media {
            PayloadMedia::PhotoUrl(_) => "Image could not be delivered",
            _ => "Video could not be delivered",
        };
        let fallback = self.formatter.degraded(&payload.text, sub, note);

        match self.sink.send_text(&self.cfg.destination, &fallback).await {
            Ok(()) => {
                counter!("deliver_sent_total").increment(1);
                tracing::info!(id = %sub.id, "degraded notification delivered");
                Outcome::Delivered
            }
            Err(e) => {
                tracing::warn!(id = %sub.id, error = %e, "degraded send failed, parking message");
                let media_url = match &payload.media {
                    PayloadMedia::PhotoUrl(url) => Some(url.clone()),
                    _ => None,
                };
                let parked =
                    FailedMessage::new(payload.text.clone(), media_url, Some(sub.permalink.clone()));
                if let Err(e) = self.failed.push(parked).await {
                    tracing::error!(id = %sub.id, error = %e, "parking failed message");
                }
                Outcome::Rejected
            }
        }
    }
}

fn acquire_note(err: &MediaError) -> &'static str {
    match err {
        MediaError::TooLarge { .. } => "Video too large to deliver",
        MediaError::Timeout(_) => "Video download timed out",
        _ => "Video could not be retrieved",
    }
}
