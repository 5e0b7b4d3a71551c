//! Fallback extraction for pages of unknown shape

use crate::extract::html::{clean_text, first_value, page_text, BOILERPLATE_TAGS};
use crate::extract::{base_metadata, ExtractError, ExtractedContent, Extractor, Fetcher};
use crate::state::SourceType;
use async_trait::async_trait;
use scraper::Html;
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

/// Strategy for any page: all visible text minus boilerplate
pub struct GenericExtractor {
    fetcher: Arc<dyn Fetcher>,
}

impl GenericExtractor {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Extractor for GenericExtractor {
    fn name(&self) -> &'static str {
        "generic"
    }

    async fn extract(&self, url: &Url) -> Result<ExtractedContent, ExtractError> {
        let page = self.fetcher.fetch(url).await?;
        let mut content = extract_page(&page.body)?;

        let mut metadata = base_metadata(url, &page.final_url, SourceType::Generic, self.name());
        metadata.append(&mut content.metadata);
        content.metadata = metadata;
        Ok(content)
    }
}

pub fn extract_page(html: &str) -> Result<ExtractedContent, ExtractError> {
    let document = Html::parse_document(html);

    let clean = clean_text(&page_text(&document, BOILERPLATE_TAGS));
    if clean.is_empty() {
        return Err(ExtractError::EmptyContent);
    }

    let mut metadata = Map::new();
    if let Some(title) = first_value(&document, &["title"], &[])? {
        metadata.insert("title".into(), Value::from(clean_text(&title)));
    }
    metadata.insert(
        "word_count".into(),
        Value::from(clean.split(' ').count()),
    );

    Ok(ExtractedContent {
        clean_text: clean,
        metadata,
    })
}
