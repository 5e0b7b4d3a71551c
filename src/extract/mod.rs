//! Content extraction strategies
//!
//! Every source type maps to exactly one [`Extractor`] through a
//! [`StrategyTable`]. Extractors fetch once and either return content or
//! fail; retrying is left to the orchestrator.

mod fetcher;
mod generic;
pub mod html;
mod news;
mod social;

pub use fetcher::{build_http_client, format_user_agent, FetchError, FetchedPage, Fetcher, HttpFetcher};
pub use generic::GenericExtractor;
pub use news::NewsExtractor;
pub use social::SocialExtractor;

use crate::state::SourceType;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Output of a successful extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedContent {
    pub clean_text: String,
    pub metadata: Map<String, Value>,
}

impl ExtractedContent {
    pub fn new(clean_text: impl Into<String>) -> Self {
        Self {
            clean_text: clean_text.into(),
            metadata: Map::new(),
        }
    }

    /// Adds a metadata entry, builder style
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Errors raised by an [`Extractor`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("no extractable content")]
    EmptyContent,

    #[error("page is behind a login wall")]
    LoginWall,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

/// A pluggable extraction strategy
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Short name used in logs and in the `method` metadata entry
    fn name(&self) -> &'static str;

    async fn extract(&self, url: &Url) -> Result<ExtractedContent, ExtractError>;
}

/// Source type -> strategy dispatch table
#[derive(Clone, Default)]
pub struct StrategyTable {
    strategies: HashMap<SourceType, Arc<dyn Extractor>>,
}

impl StrategyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in news, social and generic strategies sharing one fetcher
    pub fn standard(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new()
            .with(SourceType::News, Arc::new(NewsExtractor::new(fetcher.clone())))
            .with(SourceType::Social, Arc::new(SocialExtractor::new(fetcher.clone())))
            .with(SourceType::Generic, Arc::new(GenericExtractor::new(fetcher)))
    }

    /// Binds `source_type` to `strategy`, replacing any previous binding
    pub fn with(mut self, source_type: SourceType, strategy: Arc<dyn Extractor>) -> Self {
        self.register(source_type, strategy);
        self
    }

    pub fn register(&mut self, source_type: SourceType, strategy: Arc<dyn Extractor>) {
        self.strategies.insert(source_type, strategy);
    }

    pub fn get(&self, source_type: SourceType) -> Option<Arc<dyn Extractor>> {
        self.strategies.get(&source_type).cloned()
    }

    pub fn is_complete(&self) -> bool {
        SourceType::all()
            .iter()
            .all(|source_type| self.strategies.contains_key(source_type))
    }
}

impl fmt::Debug for StrategyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self
            .strategies
            .iter()
            .map(|(source_type, strategy)| (source_type.to_db_string(), strategy.name()))
            .collect();
        entries.sort();
        f.debug_map().entries(entries).finish()
    }
}

/// Metadata every strategy stamps on its output
pub(crate) fn base_metadata(
    requested: &Url,
    fetched: &Url,
    source_type: SourceType,
    method: &str,
) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("source_url".into(), Value::from(requested.as_str()));
    if fetched != requested {
        metadata.insert("final_url".into(), Value::from(fetched.as_str()));
    }
    metadata.insert("source_type".into(), Value::from(source_type.to_string()));
    if let Some(domain) = crate::url::extract_domain(fetched) {
        metadata.insert("domain".into(), Value::from(domain));
    }
    metadata.insert("scraped_at".into(), Value::from(Utc::now().to_rfc3339()));
    metadata.insert("method".into(), Value::from(method));
    metadata
}
