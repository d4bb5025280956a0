// src/config.rs
//! Process configuration: a TOML file located via env var with a fallback
//! path, with secrets overridable from the environment. Loaded once at
//! startup, never hot-reloaded.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::format::PresentationConfig;

const ENV_PATH: &str = "NOTIFIER_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/notifier.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    pub sources: Vec<SourceConfig>,
    /// Base seconds between poll cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Forward submissions with no media at all.
    #[serde(default)]
    pub send_text_only_posts: bool,
    #[serde(default)]
    pub presentation: PresentationConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub user_agent: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent: "reddit-to-telegram/0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// One watched feed. `poll_interval_secs` overrides the base cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Acquisition size budget. The sink itself caps uploads at 50 MB.
    pub max_bytes: u64,
    /// Acquisition wall-clock budget in seconds.
    pub timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_bytes: 50 * 1024 * 1024,
            timeout_secs: 180,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub max_attempts: u32,
    /// Minimum gap between sink sends.
    pub min_send_gap_ms: u64,
    /// First backoff delay after a retryable delivery failure.
    pub retry_base_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            min_send_gap_ms: 2_000,
            retry_base_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub dedup_path: PathBuf,
    pub failed_path: PathBuf,
    /// Optional dedup cap (FIFO eviction). Unset means the set only grows.
    pub dedup_capacity: Option<usize>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dedup_path: PathBuf::from("state/processed_posts.json"),
            failed_path: PathBuf::from("state/failed_messages.json"),
            dedup_capacity: None,
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_fetch_limit() -> u32 {
    10
}

/// Load configuration using env var + fallback:
/// 1) $NOTIFIER_CONFIG_PATH
/// 2) config/notifier.toml
/// When neither exists, a commented sample is written to the default path
/// and loading fails so the operator can fill in credentials.
pub fn load() -> Result<AppConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            bail!("{ENV_PATH} points to non-existent path {}", pb.display());
        }
        return load_from(&pb);
    }

    let default = PathBuf::from(DEFAULT_PATH);
    if default.exists() {
        return load_from(&default);
    }

    write_sample(&default)
        .with_context(|| format!("writing sample config to {}", default.display()))?;
    bail!(
        "no configuration found; a sample was written to {} — edit it and run again",
        default.display()
    );
}

pub fn load_from(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let mut cfg: AppConfig =
        toml::from_str(&raw).with_context(|| format!("parsing config at {}", path.display()))?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

/// Secrets may live in the environment (or `.env`) instead of the file.
fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("TELEGRAM_BOT_TOKEN") {
        cfg.telegram.bot_token = v;
    }
    if let Ok(v) = std::env::var("TELEGRAM_CHAT_ID") {
        cfg.telegram.chat_id = v;
    }
    if let Ok(v) = std::env::var("REDDIT_USER_AGENT") {
        cfg.reddit.user_agent = v;
    }
}

fn validate(cfg: &AppConfig) -> Result<()> {
    if cfg.sources.is_empty() {
        bail!("config lists no sources to watch");
    }
    if let Some(sc) = cfg.sources.iter().find(|s| s.name.trim().is_empty()) {
        bail!("source with empty name (fetch_limit {})", sc.fetch_limit);
    }
    if cfg.telegram.bot_token.trim().is_empty() {
        bail!("telegram.bot_token is empty (set it in the config or TELEGRAM_BOT_TOKEN)");
    }
    if cfg.telegram.chat_id.trim().is_empty() {
        bail!("telegram.chat_id is empty (set it in the config or TELEGRAM_CHAT_ID)");
    }
    Ok(())
}

fn write_sample(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, SAMPLE_CONFIG)?;
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# reddit-to-telegram configuration

poll_interval_secs = 300
send_text_only_posts = false

[reddit]
user_agent = "reddit-to-telegram/0.1 by your_username"

[telegram]
# Both may instead come from TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID.
bot_token = ""
chat_id = ""

[[sources]]
name = "pics"
fetch_limit = 10

[[sources]]
name = "videos"
fetch_limit = 10
# poll_interval_secs = 600   # per-source cadence override

[presentation]
show_category_emoji = true
# cta_link = "https://t.me/your_bot"
# cta_label = "See more"

[media]
max_bytes = 52428800
timeout_secs = 180

[delivery]
max_attempts = 4
min_send_gap_ms = 2000
retry_base_ms = 500

[state]
dedup_path = "state/processed_posts.json"
failed_path = "state/failed_messages.json"
# dedup_capacity = 50000
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn minimal() -> &'static str {
        r#"
            [telegram]
            bot_token = "123:abc"
            chat_id = "-100200300"

            [[sources]]
            name = "demo"
        "#
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg: AppConfig = toml::from_str(minimal()).unwrap();
        assert_eq!(cfg.poll_interval_secs, 300);
        assert_eq!(cfg.sources[0].fetch_limit, 10);
        assert_eq!(cfg.sources[0].poll_interval_secs, None);
        assert!(!cfg.send_text_only_posts);
        assert_eq!(cfg.delivery.max_attempts, 4);
        assert_eq!(cfg.state.dedup_path, PathBuf::from("state/processed_posts.json"));
    }

    #[test]
    fn sample_config_parses() {
        let cfg: AppConfig = toml::from_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(cfg.sources.len(), 2);
        assert_eq!(cfg.media.max_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn empty_sources_fail_validation() {
        let cfg: AppConfig = toml::from_str(
            r#"
                sources = []

                [telegram]
                bot_token = "t"
                chat_id = "c"
            "#,
        )
        .unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_beat_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifier.toml");
        std::fs::write(&path, minimal()).unwrap();

        env::set_var("TELEGRAM_BOT_TOKEN", "999:zzz");
        let cfg = load_from(&path).unwrap();
        env::remove_var("TELEGRAM_BOT_TOKEN");

        assert_eq!(cfg.telegram.bot_token, "999:zzz");
        assert_eq!(cfg.telegram.chat_id, "-100200300");
    }

    #[serial_test::serial]
    #[test]
    fn missing_token_fails_validation() {
        env::remove_var("TELEGRAM_BOT_TOKEN");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifier.toml");
        std::fs::write(
            &path,
            r#"
                [telegram]
                chat_id = "c"

                [[sources]]
                name = "demo"
            "#,
        )
        .unwrap();
        assert!(load_from(&path).is_err());
    }
}
