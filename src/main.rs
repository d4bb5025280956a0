//! Binary entrypoint: load config, wire the pipeline, run the engine
//! until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reddit_to_telegram::config;
use reddit_to_telegram::dedup::JsonFileDedupStore;
use reddit_to_telegram::engine::{Engine, EngineConfig};
use reddit_to_telegram::format::MessageFormatter;
use reddit_to_telegram::ingest::providers::reddit::RedditSource;
use reddit_to_telegram::media::MediaAcquirer;
use reddit_to_telegram::notify::failed::FailedMessageStore;
use reddit_to_telegram::notify::telegram::TelegramNotifier;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("reddit_to_telegram=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent. This lets
    // TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID live outside the config file.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = config::load()?;

    let dedup = Arc::new(
        JsonFileDedupStore::open(cfg.state.dedup_path.clone(), cfg.state.dedup_capacity).await?,
    );
    tracing::info!(known = dedup.len().await, "dedup state loaded");

    let failed = Arc::new(FailedMessageStore::open(cfg.state.failed_path.clone()).await?);

    let source = Arc::new(RedditSource::new(cfg.reddit.user_agent.clone()));
    let sink = Arc::new(
        TelegramNotifier::new(cfg.telegram.bot_token.clone())
            .with_min_send_gap(Duration::from_millis(cfg.delivery.min_send_gap_ms)),
    );
    let acquirer = MediaAcquirer::new(
        cfg.media.max_bytes,
        Duration::from_secs(cfg.media.timeout_secs),
    );
    let formatter = MessageFormatter::new(cfg.presentation.clone());

    let engine = Engine::new(
        EngineConfig {
            destination: cfg.telegram.chat_id.clone(),
            poll_interval: Duration::from_secs(cfg.poll_interval_secs),
            sources: cfg.sources.clone(),
            send_text_only_posts: cfg.send_text_only_posts,
            max_delivery_attempts: cfg.delivery.max_attempts,
            retry_base: Duration::from_millis(cfg.delivery.retry_base_ms),
        },
        source,
        dedup,
        sink,
        acquirer,
        formatter,
        failed,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    engine.run(shutdown_rx).await;
    Ok(())
}
