//! Social platform post extraction
//!
//! Works from the server-rendered HTML only. Platforms that render posts
//! client-side usually still ship OpenGraph tags, which are used as the
//! fallback before giving up on the page text.

use crate::extract::html::{
    absolute_url, clean_text, first_value, page_text, parse_selector, pattern, push_unique,
    BOILERPLATE_TAGS,
};
use crate::extract::{base_metadata, ExtractError, ExtractedContent, Extractor, Fetcher};
use crate::state::SourceType;
use crate::url::{extract_domain, matches_wildcard};
use async_trait::async_trait;
use scraper::Html;
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

/// Phrases X shows in place of the post to signed-out visitors
const LOGIN_WALL_INDICATORS: &[&str] = &[
    "Don't miss what's happening",
    "People on X are the first to know",
    "See new posts",
    "To view this content, please",
    "Log in to X",
    "Sign up for X",
    "Join X today",
];

/// Button labels that only mark a wall when the page has nothing else
const LOGIN_PROMPTS: &[&str] = &["Log in", "Sign up"];

/// Page text longer than this is treated as real content despite login prompts
const MAX_PROMPT_ONLY_CHARS: usize = 200;

const TWITTER_POST_SELECTORS: &[&str] = &[
    r#"[data-testid="tweetText"]"#,
    "article div[lang]",
    r#"[role="article"]"#,
];

const REDDIT_POST_SELECTORS: &[&str] = &[
    r#"shreddit-post [slot="text-body"]"#,
    r#"[data-testid="post-container"]"#,
    r#"[data-click-id="text"]"#,
    ".usertext-body",
];

const GENERIC_POST_SELECTORS: &[&str] = &[r#"[role="article"]"#, "article"];

const DESCRIPTION_META: &[&str] = &[
    r#"meta[property="og:description"]"#,
    r#"meta[name="twitter:description"]"#,
    r#"meta[name="description"]"#,
];

const TITLE_META: &[&str] = &[
    r#"meta[property="og:title"]"#,
    r#"meta[name="twitter:title"]"#,
    "title",
];

const IMAGE_META: &[&str] = &[
    r#"meta[property="og:image"]"#,
    r#"meta[name="twitter:image"]"#,
];

const IMAGE_SELECTORS: &[&str] = &[
    r#"[data-testid="tweetPhoto"] img"#,
    r#"div[data-testid="card.layoutLarge.media"] img"#,
    r#"article img[src*="twimg.com"]"#,
];

const VIDEO_SELECTORS: &[&str] = &[
    r#"[data-testid="videoComponent"]"#,
    "video",
    r#"[data-testid="tweetVideo"]"#,
    r#"meta[property="og:video"]"#,
];

const COUNTER_SELECTORS: &[(&str, &str)] = &[
    ("likes", r#"[data-testid="like"] span"#),
    ("retweets", r#"[data-testid="retweet"] span"#),
    ("replies", r#"[data-testid="reply"] span"#),
    ("views", r#"[data-testid="app-text-transition-container"] span"#),
];

/// Post fragments shorter than this are buttons and labels, not content
const MIN_FRAGMENT_CHARS: usize = 20;

/// Which platform a social URL belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Twitter,
    Reddit,
    Other,
}

impl Platform {
    pub fn detect(url: &Url) -> Self {
        let Some(domain) = extract_domain(url) else {
            return Self::Other;
        };
        fn any_of(patterns: &[&str], domain: &str) -> bool {
            patterns.iter().any(|p| matches_wildcard(p, domain))
        }

        if any_of(&["*.twitter.com", "*.x.com", "t.co"], &domain) {
            Self::Twitter
        } else if any_of(&["*.reddit.com", "redd.it"], &domain) {
            Self::Reddit
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Reddit => "reddit",
            Self::Other => "other",
        }
    }

    fn post_selectors(&self) -> &'static [&'static str] {
        match self {
            Self::Twitter => TWITTER_POST_SELECTORS,
            Self::Reddit => REDDIT_POST_SELECTORS,
            Self::Other => GENERIC_POST_SELECTORS,
        }
    }
}

/// Strategy for social platform posts
pub struct SocialExtractor {
    fetcher: Arc<dyn Fetcher>,
}

impl SocialExtractor {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Extractor for SocialExtractor {
    fn name(&self) -> &'static str {
        "social"
    }

    async fn extract(&self, url: &Url) -> Result<ExtractedContent, ExtractError> {
        let page = self.fetcher.fetch(url).await?;
        let mut content = extract_post(&page.body, url)?;

        let mut metadata = base_metadata(url, &page.final_url, SourceType::Social, self.name());
        metadata.append(&mut content.metadata);
        content.metadata = metadata;
        Ok(content)
    }
}

/// Extracts a social post from HTML
///
/// `url` is the post's URL as submitted; ids are derived from it.
pub fn extract_post(html: &str, url: &Url) -> Result<ExtractedContent, ExtractError> {
    let platform = Platform::detect(url);
    let document = Html::parse_document(html);
    let mut metadata = Map::new();
    metadata.insert("platform".into(), Value::from(platform.as_str()));

    let (text, from) = match post_text(&document, platform)? {
        Some(text) => (text, "selectors"),
        None => match first_value(&document, DESCRIPTION_META, &["content"])? {
            Some(text) => (text, "opengraph"),
            None => (page_text(&document, BOILERPLATE_TAGS), "page_text"),
        },
    };

    if platform == Platform::Twitter && is_login_wall(&text, from == "page_text") {
        return Err(ExtractError::LoginWall);
    }

    let clean = clean_text(&text);
    if clean.is_empty() {
        return Err(ExtractError::EmptyContent);
    }
    metadata.insert("text_source".into(), Value::from(from));

    if let Some(title) = first_value(&document, TITLE_META, &["content"])? {
        metadata.insert("title".into(), Value::from(clean_text(&title)));
    }

    let images = images(&document, url)?;
    if !images.is_empty() {
        metadata.insert("image_count".into(), Value::from(images.len()));
        metadata.insert("image_urls".into(), Value::from(images));
    }

    video_info(&document, url, &mut metadata)?;
    engagement_counters(&document, &mut metadata)?;
    post_identifiers(url, platform, &mut metadata)?;

    Ok(ExtractedContent {
        clean_text: clean,
        metadata,
    })
}

/// Text fragments of the post body, joined by blank lines
fn post_text(document: &Html, platform: Platform) -> Result<Option<String>, ExtractError> {
    for css in platform.post_selectors() {
        let selector = parse_selector(css)?;
        let parts: Vec<String> = document
            .select(&selector)
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|text| text.chars().count() > MIN_FRAGMENT_CHARS)
            .collect();
        if !parts.is_empty() {
            return Ok(Some(parts.join("\n\n")));
        }
    }
    Ok(None)
}

/// Whether X served its signed-out interstitial instead of the post
///
/// Bare "Log in" / "Sign up" prompts count only for short whole-page text,
/// where they are all that rendered.
pub fn is_login_wall(text: &str, whole_page: bool) -> bool {
    if LOGIN_WALL_INDICATORS
        .iter()
        .any(|indicator| text.contains(indicator))
    {
        return true;
    }
    whole_page
        && text.chars().count() <= MAX_PROMPT_ONLY_CHARS
        && LOGIN_PROMPTS.iter().all(|prompt| text.contains(prompt))
}

fn images(document: &Html, base_url: &Url) -> Result<Vec<String>, ExtractError> {
    let mut images = Vec::new();

    for css in IMAGE_META {
        let selector = parse_selector(css)?;
        for meta in document.select(&selector) {
            if let Some(full) = meta
                .value()
                .attr("content")
                .and_then(|src| absolute_url(base_url, src))
            {
                push_unique(&mut images, full);
            }
        }
    }

    for css in IMAGE_SELECTORS {
        let selector = parse_selector(css)?;
        for img in document.select(&selector) {
            let Some(src) = img.value().attr("src") else {
                continue;
            };
            if src.contains("profile_images") {
                continue;
            }
            if let Some(full) = absolute_url(base_url, &src.replace("&name=small", "&name=large"))
            {
                push_unique(&mut images, full);
            }
        }
    }

    Ok(images)
}

fn video_info(
    document: &Html,
    base_url: &Url,
    metadata: &mut Map<String, Value>,
) -> Result<(), ExtractError> {
    for css in VIDEO_SELECTORS {
        let selector = parse_selector(css)?;
        if let Some(video) = document.select(&selector).next() {
            metadata.insert("has_video".into(), Value::from(true));
            if let Some(thumbnail) = video
                .value()
                .attr("poster")
                .and_then(|src| absolute_url(base_url, src))
            {
                metadata.insert("thumbnail_url".into(), Value::from(thumbnail));
            }
            break;
        }
    }
    Ok(())
}

/// Parses counters such as `1,234`, `12.5K` or `3M`
pub fn parse_count(raw: &str) -> Option<u64> {
    let raw = raw.trim().replace(',', "");
    let (number, multiplier) = match raw.chars().last()? {
        'k' | 'K' => (&raw[..raw.len() - 1], 1_000.0),
        'm' | 'M' => (&raw[..raw.len() - 1], 1_000_000.0),
        _ => (raw.as_str(), 1.0),
    };
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as u64)
}

fn engagement_counters(
    document: &Html,
    metadata: &mut Map<String, Value>,
) -> Result<(), ExtractError> {
    let counter = pattern(r"[\d.,]+[KkMm]?")?;

    for (key, css) in COUNTER_SELECTORS {
        let selector = parse_selector(css)?;
        // the count is in the last span; earlier ones hold icons and labels
        let Some(element) = document.select(&selector).last() else {
            continue;
        };
        let text = element.text().collect::<String>();
        if let Some(n) = counter.find(&text).and_then(|m| parse_count(m.as_str())) {
            metadata.insert(key.to_string(), Value::from(n));
        }
    }
    Ok(())
}

fn post_identifiers(
    url: &Url,
    platform: Platform,
    metadata: &mut Map<String, Value>,
) -> Result<(), ExtractError> {
    match platform {
        Platform::Twitter => {
            let status = pattern(r"(?:twitter|x)\.com/(\w+)/status/(\d+)")?;
            if let Some(caps) = status.captures(url.as_str()) {
                metadata.insert("author_handle".into(), Value::from(&caps[1]));
                metadata.insert("tweet_id".into(), Value::from(&caps[2]));
            }
        }
        Platform::Reddit => {
            let subreddit = pattern(r"reddit\.com/r/([^/]+)")?;
            if let Some(caps) = subreddit.captures(url.as_str()) {
                metadata.insert("subreddit".into(), Value::from(&caps[1]));
            }
        }
        Platform::Other => {}
    }
    Ok(())
}
