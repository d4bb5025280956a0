//! Content classification.
//!
//! Maps a submission's raw attributes to exactly one [`ContentCategory`].
//! Categories are a closed enum evaluated in a fixed priority order (a
//! submission can nominally match several — a hosted video also carries a
//! thumbnail link), so precedence lives here and nowhere else:
//!
//! 1. hosted-video   — platform-native video (media object or v.redd.it link)
//! 2. external-video-link — recognized third-party video host in url/body
//! 3. image          — direct URL with an image extension
//! 4. generic-video  — direct URL with a video extension
//! 5. generic-link   — any other URL in descriptor or body
//! 6. text           — none of the above
//!
//! Classification never fails; anything unrecognizable degrades to `text`.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::ingest::types::{MediaDescriptor, Submission};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentCategory {
    Text,
    Image,
    HostedVideo,
    GenericVideo,
    ExternalVideoLink,
    GenericLink,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Text => "text",
            ContentCategory::Image => "image",
            ContentCategory::HostedVideo => "hosted-video",
            ContentCategory::GenericVideo => "generic-video",
            ContentCategory::ExternalVideoLink => "external-video-link",
            ContentCategory::GenericLink => "generic-link",
        }
    }
}

/// Normalized media reference extracted alongside the category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    /// Plain remote URL (image, external link, ...).
    Url(String),
    /// Hosted-video rendition to acquire before delivery. Direct MP4
    /// fallback preferred; a playlist manifest otherwise.
    HostedManifest(String),
}

impl MediaRef {
    pub fn url(&self) -> &str {
        match self {
            MediaRef::Url(u) | MediaRef::HostedManifest(u) => u,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: ContentCategory,
    pub media: Option<MediaRef>,
}

const IMAGE_EXTS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];
const VIDEO_EXTS: &[&str] = &[".mp4", ".webm", ".mov"];
const HOSTED_VIDEO_HOST: &str = "v.redd.it";

fn external_video_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)https?://(?:[\w.-]*\.)?(youtube\.com|youtu\.be|vimeo\.com|streamable\.com)/\S*").unwrap()
    })
}

fn any_url_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>()"']+"#).unwrap())
}

/// Feeds escape `&` as `&amp;` inside media URLs; undo that before the URL
/// leaves the pipeline.
fn decode_url(url: &str) -> String {
    html_escape::decode_html_entities(url).into_owned()
}

fn has_ext(url: &str, exts: &[&str]) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    exts.iter().any(|e| path.ends_with(e))
}

fn first_url_in(text: &str) -> Option<String> {
    any_url_re().find(text).map(|m| m.as_str().to_string())
}

/// Classify one submission. Pure and deterministic: same attributes in,
/// same category and media reference out.
pub fn classify(sub: &Submission) -> Classification {
    let link = match &sub.media {
        MediaDescriptor::Link(url) => Some(decode_url(url)),
        _ => None,
    };
    let body = sub.body_text().unwrap_or("");

    // 1. hosted-video
    if let MediaDescriptor::HostedVideo { fallback_url, hls_url } = &sub.media {
        let manifest = fallback_url
            .as_deref()
            .or(hls_url.as_deref())
            .map(decode_url);
        return Classification {
            category: ContentCategory::HostedVideo,
            media: manifest.map(MediaRef::HostedManifest),
        };
    }
    if let Some(url) = link.as_deref().filter(|u| u.contains(HOSTED_VIDEO_HOST)) {
        // Bare v.redd.it link without a media object; the DASH rendition
        // lives under a well-known path.
        return Classification {
            category: ContentCategory::HostedVideo,
            media: Some(MediaRef::HostedManifest(format!(
                "{}/DASH_720.mp4",
                url.trim_end_matches('/')
            ))),
        };
    }

    // 2. external-video-link
    if let Some(url) = link
        .as_deref()
        .filter(|u| external_video_re().is_match(u))
        .map(str::to_string)
        .or_else(|| external_video_re().find(body).map(|m| m.as_str().to_string()))
    {
        return Classification {
            category: ContentCategory::ExternalVideoLink,
            media: Some(MediaRef::Url(url)),
        };
    }

    // 3. image / 4. generic-video by direct extension
    if let Some(url) = link.as_deref() {
        if has_ext(url, IMAGE_EXTS) {
            return Classification {
                category: ContentCategory::Image,
                media: Some(MediaRef::Url(url.to_string())),
            };
        }
        if has_ext(url, VIDEO_EXTS) {
            return Classification {
                category: ContentCategory::GenericVideo,
                media: Some(MediaRef::Url(url.to_string())),
            };
        }
    }

    // 5. generic-link
    if let Some(url) = link.or_else(|| first_url_in(body)) {
        return Classification {
            category: ContentCategory::GenericLink,
            media: Some(MediaRef::Url(url)),
        };
    }

    // 6. text
    Classification {
        category: ContentCategory::Text,
        media: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::MediaDescriptor;

    fn sub(media: MediaDescriptor, body: Option<&str>) -> Submission {
        Submission {
            id: "t3_x".into(),
            source: "demo".into(),
            title: "title".into(),
            author: "a".into(),
            body: body.map(str::to_string),
            media,
            score: 0,
            num_comments: 0,
            created_at: 0,
            over_18: false,
            permalink: "https://www.reddit.com/r/demo/x".into(),
        }
    }

    #[test]
    fn hosted_video_beats_external_link_in_body() {
        let s = sub(
            MediaDescriptor::HostedVideo {
                fallback_url: Some("https://v.redd.it/x/DASH_720.mp4".into()),
                hls_url: None,
            },
            Some("also on https://youtube.com/watch?v=abc"),
        );
        let c = classify(&s);
        assert_eq!(c.category, ContentCategory::HostedVideo);
        assert_eq!(
            c.media,
            Some(MediaRef::HostedManifest("https://v.redd.it/x/DASH_720.mp4".into()))
        );
    }

    #[test]
    fn bare_vreddit_link_is_hosted_video() {
        let c = classify(&sub(MediaDescriptor::Link("https://v.redd.it/abc".into()), None));
        assert_eq!(c.category, ContentCategory::HostedVideo);
        assert_eq!(
            c.media,
            Some(MediaRef::HostedManifest("https://v.redd.it/abc/DASH_720.mp4".into()))
        );
    }

    #[test]
    fn direct_image_extension_wins_over_generic_link() {
        let c = classify(&sub(
            MediaDescriptor::Link("https://i.redd.it/pic.jpg?width=640&amp;s=sig".into()),
            None,
        ));
        assert_eq!(c.category, ContentCategory::Image);
        // extension check ignores the query string, entities are decoded
        assert_eq!(
            c.media,
            Some(MediaRef::Url("https://i.redd.it/pic.jpg?width=640&s=sig".into()))
        );
    }

    #[test]
    fn youtube_in_body_of_self_post() {
        let c = classify(&sub(
            MediaDescriptor::None,
            Some("watch this https://youtu.be/dQw4w9WgXcQ now"),
        ));
        assert_eq!(c.category, ContentCategory::ExternalVideoLink);
        assert_eq!(c.media, Some(MediaRef::Url("https://youtu.be/dQw4w9WgXcQ".into())));
    }

    #[test]
    fn mp4_link_is_generic_video() {
        let c = classify(&sub(MediaDescriptor::Link("https://cdn.example.com/clip.mp4".into()), None));
        assert_eq!(c.category, ContentCategory::GenericVideo);
    }

    #[test]
    fn plain_outbound_link_is_generic_link() {
        let c = classify(&sub(MediaDescriptor::Link("https://example.com/article".into()), None));
        assert_eq!(c.category, ContentCategory::GenericLink);
    }

    #[test]
    fn bodyless_self_post_is_text() {
        let c = classify(&sub(MediaDescriptor::None, None));
        assert_eq!(c.category, ContentCategory::Text);
        assert_eq!(c.media, None);
    }

    #[test]
    fn classification_is_deterministic() {
        let s = sub(MediaDescriptor::Link("https://example.com/a.png".into()), Some("x"));
        assert_eq!(classify(&s), classify(&s));
    }
}
