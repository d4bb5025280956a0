// src/ingest/mod.rs
pub mod providers;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::ingest::types::Submission;

/// One-time metrics registration (so series show up on whatever recorder
/// the embedding process installs).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_submissions_total",
            "Submissions decoded from feed listings."
        );
        describe_counter!(
            "ingest_fetch_errors_total",
            "Feed fetch/decode errors (source skipped for the cycle)."
        );
        describe_counter!(
            "ingest_seen_total",
            "Submissions dropped because they were already delivered."
        );
        describe_counter!(
            "deliver_sent_total",
            "Notifications accepted by the sink."
        );
        describe_counter!(
            "deliver_retries_total",
            "Delivery attempts retried after a retryable failure."
        );
        describe_counter!(
            "deliver_rejected_total",
            "Notifications terminally rejected by the sink."
        );
        describe_counter!(
            "media_acquire_failures_total",
            "Hosted-video acquisitions that fell back to a link payload."
        );
        describe_histogram!("ingest_parse_ms", "Listing decode time in milliseconds.");
        describe_gauge!("poll_last_run_ts", "Unix ts when the poll cycle last ran.");
    });
}

/// Order a fetched batch oldest-first so notifications preserve the feed's
/// chronology within one cycle. Listing endpoints return newest-first.
pub fn sort_oldest_first(mut batch: Vec<Submission>) -> Vec<Submission> {
    batch.sort_by_key(|s| s.created_at);
    batch
}
