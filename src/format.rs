//! Notification text building.
//!
//! Everything here is deterministic and side-effect free: (submission,
//! category, presentation config) in, message text out. All dynamic fields
//! pass through [`escape_markdown`] before they touch a template, so a
//! hostile title can never corrupt the sink's markup or smuggle formatting
//! into the message.

use serde::Deserialize;

use crate::classify::{Classification, ContentCategory};
use crate::ingest::types::Submission;

/// Static presentation knobs, loaded once from config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Prefix messages with a category emoji.
    pub show_category_emoji: bool,
    /// Outbound call-to-action appended to every message.
    pub cta_link: Option<String>,
    pub cta_label: String,
    pub templates: MessageTemplates,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            show_category_emoji: true,
            cta_link: None,
            cta_label: "See more".to_string(),
            templates: MessageTemplates::default(),
        }
    }
}

/// Body templates. Placeholders: `{subject}`, `{title}`, `{source}`,
/// `{author}` — replaced with already-escaped values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    pub with_subject: String,
    pub without_subject: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            with_subject: "🔥 *{subject}*\n\n{title}".to_string(),
            without_subject: "*New on r/{source}*\n\n{title}".to_string(),
        }
    }
}

/// Escape the sink's markup-control characters (Telegram legacy Markdown:
/// `_`, `*`, `` ` ``, `[`). Anything else passes through untouched — a
/// backslash before a non-special character would itself be rendered.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Best-effort subject extraction from a title of the form
/// `Subject | rest of title`. The prefix only counts as a subject when it
/// contains at least one capitalized word longer than one character, so
/// `18+ | something` stays subjectless.
pub fn extract_subject(title: &str) -> Option<String> {
    let (prefix, _) = title.split_once('|')?;
    let candidate = prefix.trim();
    if candidate.is_empty() {
        return None;
    }

    let has_proper_word = candidate
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphabetic()))
        .filter(|w| !w.is_empty())
        .any(|w| w.chars().next().is_some_and(char::is_uppercase) && w.chars().count() > 1);

    has_proper_word.then(|| candidate.to_string())
}

pub fn category_emoji(category: ContentCategory) -> &'static str {
    match category {
        ContentCategory::Text => "📝",
        ContentCategory::Image => "🖼️",
        ContentCategory::HostedVideo => "🎥",
        ContentCategory::GenericVideo => "🎬",
        ContentCategory::ExternalVideoLink => "📺",
        ContentCategory::GenericLink => "🔗",
    }
}

#[derive(Debug, Clone)]
pub struct MessageFormatter {
    cfg: PresentationConfig,
}

impl MessageFormatter {
    pub fn new(cfg: PresentationConfig) -> Self {
        Self { cfg }
    }

    /// Render the notification text for one submission.
    pub fn render(&self, sub: &Submission, class: &Classification) -> String {
        let subject = extract_subject(&sub.title);

        let template = if subject.is_some() {
            &self.cfg.templates.with_subject
        } else {
            &self.cfg.templates.without_subject
        };

        let mut body = template
            .replace("{subject}", &escape_markdown(subject.as_deref().unwrap_or("")))
            .replace("{title}", &escape_markdown(&sub.title))
            .replace("{source}", &escape_markdown(&sub.source))
            .replace("{author}", &escape_markdown(&sub.author));

        // Link-style categories carry the target on its own line; the sink
        // auto-links a bare URL, which sidesteps markup injection entirely.
        if matches!(
            class.category,
            ContentCategory::ExternalVideoLink
                | ContentCategory::GenericLink
                | ContentCategory::GenericVideo
        ) {
            if let Some(media) = &class.media {
                body.push_str("\n\n🔗 ");
                body.push_str(media.url());
            }
        }

        if let Some(link) = &self.cfg.cta_link {
            body.push_str(&format!("\n\n👉 [{}]({link})", self.cfg.cta_label));
        }

        if self.cfg.show_category_emoji {
            format!("{}\n\n{}", category_emoji(class.category), body)
        } else {
            body
        }
    }

    /// Decorate a message whose rich media could not be delivered: warning
    /// line plus a link back to the original post.
    pub fn degraded(&self, text: &str, sub: &Submission, note: &str) -> String {
        format!("{text}\n\n⚠️ {note}\n📝 [View original post]({})", sub.permalink)
    }
}
