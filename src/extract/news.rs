//! News article extraction
//!
//! Selector cascades tuned for article pages: headline, body, byline,
//! publish date, tags, inline media and engagement counters.

use crate::extract::html::{
    absolute_url, clean_text, first_value, first_value_where, page_text, parse_selector, pattern,
    push_unique, text_excluding, BOILERPLATE_TAGS,
};
use crate::extract::{base_metadata, ExtractError, ExtractedContent, Extractor, Fetcher};
use crate::state::SourceType;
use async_trait::async_trait;
use scraper::Html;
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

const TITLE_SELECTORS: &[&str] = &[
    "h1",
    "title",
    r#"meta[property="og:title"]"#,
    r#"meta[name="title"]"#,
    r#"[class*="title"]"#,
    r#"[id*="title"]"#,
];

const CONTENT_SELECTORS: &[&str] = &[
    "article",
    r#"[class*="content"]"#,
    r#"[class*="article"]"#,
    r#"[id*="content"]"#,
    r#"[id*="article"]"#,
    "main",
    ".story-body",
    ".post-content",
];

const DATE_SELECTORS: &[&str] = &[
    r#"meta[property="article:published_time"]"#,
    r#"meta[name="publish_date"]"#,
    "time[datetime]",
    r#"[class*="date"]"#,
    ".published",
    ".date-published",
];

const AUTHOR_SELECTORS: &[&str] = &[
    r#"meta[property="article:author"]"#,
    r#"meta[name="author"]"#,
    r#"[class*="author"]"#,
    ".byline",
    ".post-author",
];

const DESCRIPTION_SELECTORS: &[&str] = &[
    r#"meta[property="og:description"]"#,
    r#"meta[name="description"]"#,
    r#"[class*="description"]"#,
    ".article-description",
    ".post-excerpt",
];

const CATEGORY_SELECTORS: &[&str] = &[
    r#"[class*="category"] a"#,
    r#"[class*="tag"] a"#,
    ".post-categories a",
    ".article-tags a",
];

const IMAGE_SELECTORS: &[&str] = &[
    "article img",
    ".article-content img",
    ".post-content img",
    "main img",
    r#"[class*="image"] img"#,
    r#"img[src*="/wp-content/"]"#,
];

const VIDEO_SELECTORS: &[&str] = &[
    "video",
    r#"iframe[src*="youtube"]"#,
    r#"iframe[src*="vimeo"]"#,
    r#"[class*="video"]"#,
];

/// (metadata key, selectors) for counters shown on article pages
const COUNTER_SELECTORS: &[(&str, &[&str])] = &[
    (
        "comment_count",
        &[
            r#"[class*="comment"] [class*="count"]"#,
            r#"[class*="comment"] [class*="number"]"#,
            ".comment-count",
            ".comments-number",
        ],
    ),
    (
        "share_count",
        &[
            r#"[class*="share"] [class*="count"]"#,
            r#"[class*="share"] [class*="number"]"#,
            ".share-count",
            ".shares-number",
        ],
    ),
    (
        "view_count",
        &[
            r#"[class*="view"] [class*="count"]"#,
            r#"[class*="view"] [class*="number"]"#,
            ".view-count",
            ".views-number",
        ],
    ),
];

/// Body text also drops the page header, which on news sites is navigation
const ARTICLE_EXCLUDED_TAGS: &[&str] =
    &["script", "style", "noscript", "nav", "footer", "aside", "header"];

const MAX_IMAGES: usize = 10;
const WORDS_PER_MINUTE: usize = 200;
const MIN_TITLE_CHARS: usize = 10;

/// Strategy for news article pages
pub struct NewsExtractor {
    fetcher: Arc<dyn Fetcher>,
}

impl NewsExtractor {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Extractor for NewsExtractor {
    fn name(&self) -> &'static str {
        "news"
    }

    async fn extract(&self, url: &Url) -> Result<ExtractedContent, ExtractError> {
        let page = self.fetcher.fetch(url).await?;
        let mut content = extract_article(&page.body, &page.final_url)?;

        let mut metadata = base_metadata(url, &page.final_url, SourceType::News, self.name());
        metadata.append(&mut content.metadata);
        content.metadata = metadata;
        Ok(content)
    }
}

/// Extracts an article from HTML
///
/// Returns only the page-derived metadata; source stamps are added by the caller.
pub fn extract_article(html: &str, base_url: &Url) -> Result<ExtractedContent, ExtractError> {
    let document = Html::parse_document(html);
    let mut metadata = Map::new();

    let title = first_value_where(&document, TITLE_SELECTORS, &["content"], |t| {
        t.chars().count() > MIN_TITLE_CHARS
    })?;
    let body = article_body(&document)?;

    let clean = match &title {
        Some(title) => clean_text(&format!("{}\n\n{}", title, body)),
        None => clean_text(&body),
    };
    if clean.is_empty() {
        return Err(ExtractError::EmptyContent);
    }

    if let Some(title) = title {
        metadata.insert("title".into(), Value::from(title));
    }
    insert_opt(
        &mut metadata,
        "publish_date",
        first_value(&document, DATE_SELECTORS, &["content", "datetime"])?,
    );
    insert_opt(
        &mut metadata,
        "author",
        first_value(&document, AUTHOR_SELECTORS, &["content"])?.map(|a| clean_text(&a)),
    );
    insert_opt(
        &mut metadata,
        "description",
        first_value(&document, DESCRIPTION_SELECTORS, &["content"])?.map(|d| clean_text(&d)),
    );

    let categories = categories(&document)?;
    if !categories.is_empty() {
        metadata.insert("category_count".into(), Value::from(categories.len()));
        metadata.insert("categories".into(), Value::from(categories));
    }

    let words = page_text(&document, ARTICLE_EXCLUDED_TAGS)
        .split_whitespace()
        .count();
    metadata.insert(
        "estimated_reading_time_minutes".into(),
        Value::from((words / WORDS_PER_MINUTE).max(1)),
    );

    let images = content_images(&document, base_url)?;
    if !images.is_empty() {
        metadata.insert("image_count".into(), Value::from(images.len()));
        metadata.insert("image_urls".into(), Value::from(images));
    }

    video_info(&document, base_url, &mut metadata)?;
    engagement_counters(&document, &mut metadata)?;

    Ok(ExtractedContent {
        clean_text: clean,
        metadata,
    })
}

fn insert_opt(metadata: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        metadata.insert(key.to_string(), Value::from(value));
    }
}

/// Largest block among the first selector that matches anything,
/// then all paragraphs, then the whole page
fn article_body(document: &Html) -> Result<String, ExtractError> {
    for css in CONTENT_SELECTORS {
        let selector = parse_selector(css)?;
        let largest = document
            .select(&selector)
            .map(|element| text_excluding(element, ARTICLE_EXCLUDED_TAGS))
            .max_by_key(|text| text.trim().len());
        if let Some(text) = largest {
            if !text.trim().is_empty() {
                return Ok(text);
            }
        }
    }

    let paragraphs = parse_selector("p")?;
    let joined = document
        .select(&paragraphs)
        .map(|p| text_excluding(p, ARTICLE_EXCLUDED_TAGS))
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if !joined.is_empty() {
        return Ok(joined);
    }

    Ok(page_text(document, BOILERPLATE_TAGS))
}

fn categories(document: &Html) -> Result<Vec<String>, ExtractError> {
    let mut categories = Vec::new();
    for css in CATEGORY_SELECTORS {
        let selector = parse_selector(css)?;
        for element in document.select(&selector) {
            let category = clean_text(&element.text().collect::<String>());
            if !category.is_empty() {
                push_unique(&mut categories, category);
            }
        }
    }
    Ok(categories)
}

fn is_content_image(url: &str) -> bool {
    const EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];
    const EXCLUDED: &[&str] = &["logo", "icon", "avatar", "spinner", "loading"];

    let lower = url.to_ascii_lowercase();
    EXTENSIONS.iter().any(|ext| lower.contains(ext))
        && !EXCLUDED.iter().any(|term| lower.contains(term))
}

fn content_images(document: &Html, base_url: &Url) -> Result<Vec<String>, ExtractError> {
    let mut images = Vec::new();
    for css in IMAGE_SELECTORS {
        let selector = parse_selector(css)?;
        for img in document.select(&selector) {
            let src = img
                .value()
                .attr("src")
                .or_else(|| img.value().attr("data-src"));
            if let Some(full) = src.and_then(|s| absolute_url(base_url, s)) {
                if is_content_image(&full) {
                    push_unique(&mut images, full);
                }
            }
        }
    }
    images.truncate(MAX_IMAGES);
    Ok(images)
}

fn video_info(
    document: &Html,
    base_url: &Url,
    metadata: &mut Map<String, Value>,
) -> Result<(), ExtractError> {
    let mut count = 0usize;
    let mut thumbnail = None;

    for css in VIDEO_SELECTORS {
        let selector = parse_selector(css)?;
        let mut matches = document.select(&selector).peekable();
        if thumbnail.is_none() {
            thumbnail = matches
                .peek()
                .and_then(|v| {
                    v.value()
                        .attr("poster")
                        .or_else(|| v.value().attr("data-thumbnail"))
                })
                .and_then(|src| absolute_url(base_url, src));
        }
        count += matches.count();
    }

    if count > 0 {
        metadata.insert("has_video".into(), Value::from(true));
        metadata.insert("video_count".into(), Value::from(count));
    }
    if let Some(thumbnail) = thumbnail {
        metadata.insert("thumbnail_url".into(), Value::from(thumbnail));
    }
    Ok(())
}

fn engagement_counters(
    document: &Html,
    metadata: &mut Map<String, Value>,
) -> Result<(), ExtractError> {
    let digits = pattern(r"\d+")?;

    for (key, selectors) in COUNTER_SELECTORS {
        for css in *selectors {
            let selector = parse_selector(css)?;
            let Some(element) = document.select(&selector).next() else {
                continue;
            };
            let text = element.text().collect::<String>();
            if let Some(n) = digits
                .find(&text)
                .and_then(|m| m.as_str().parse::<u64>().ok())
            {
                metadata.insert(key.to_string(), Value::from(n));
                break;
            }
        }
    }
    Ok(())
}
