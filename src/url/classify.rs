use crate::config::Config;
use crate::state::SourceType;
use url::Url;

/// Social platforms recognised without any configuration
const BUILTIN_SOCIAL: &[&str] = &[
    "*.twitter.com",
    "*.x.com",
    "t.co",
    "*.reddit.com",
    "redd.it",
    "*.facebook.com",
    "*.instagram.com",
    "*.threads.net",
    "*.tiktok.com",
    "*.linkedin.com",
    "bsky.app",
    "mastodon.social",
    "*.youtube.com",
    "youtu.be",
];

/// News publishers recognised without any configuration
const BUILTIN_NEWS: &[&str] = &[
    "*.bbc.com",
    "*.bbc.co.uk",
    "*.cnn.com",
    "*.nytimes.com",
    "*.reuters.com",
    "*.theguardian.com",
    "*.apnews.com",
    "*.washingtonpost.com",
    "*.wsj.com",
    "*.bloomberg.com",
    "*.aljazeera.com",
    "*.npr.org",
    "*.ft.com",
];

/// Extracts the domain from a URL
///
/// Returns the lowercase host, or None if the URL has no host.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_harvest::url::extract_domain;
///
/// let url = Url::parse("https://News.Example.com:8443/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("news.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks if a domain matches a wildcard pattern
///
/// `example.com` matches only itself; `*.example.com` matches the bare
/// domain and any subdomain depth.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.reddit.com", "reddit.com"));
/// assert!(matches_wildcard("*.reddit.com", "old.reddit.com"));
/// assert!(!matches_wildcard("*.reddit.com", "notreddit.com"));
/// assert!(!matches_wildcard("t.co", "at.co"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || (candidate.len() > base.len()
                    && candidate.ends_with(base)
                    && candidate.as_bytes()[candidate.len() - base.len() - 1] == b'.')
        }
        None => candidate == pattern,
    }
}

/// Classifies job URLs into source types by host pattern
///
/// Lookup order:
/// 1. Social patterns (built-in plus `[[social]]` entries)
/// 2. News patterns (built-in plus `[[news]]` entries)
/// 3. Heuristic: a host or path segment mentioning "news"
/// 4. Generic (default)
#[derive(Debug, Clone)]
pub struct SourceClassifier {
    social: Vec<String>,
    news: Vec<String>,
}

impl SourceClassifier {
    /// Creates a classifier with only the built-in tables
    pub fn new() -> Self {
        Self {
            social: BUILTIN_SOCIAL.iter().map(|s| s.to_string()).collect(),
            news: BUILTIN_NEWS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Creates a classifier with the built-in tables extended by the config
    pub fn from_config(config: &Config) -> Self {
        let mut classifier = Self::new();
        for entry in &config.social {
            classifier = classifier.with_social_pattern(&entry.domain);
        }
        for entry in &config.news {
            classifier = classifier.with_news_pattern(&entry.domain);
        }
        classifier
    }

    pub fn with_social_pattern(mut self, pattern: &str) -> Self {
        self.social.push(pattern.to_lowercase());
        self
    }

    pub fn with_news_pattern(mut self, pattern: &str) -> Self {
        self.news.push(pattern.to_lowercase());
        self
    }

    /// Classifies a URL; unrecognised domains are `Generic`
    pub fn classify(&self, url: &Url) -> SourceType {
        let domain = match extract_domain(url) {
            Some(d) => d,
            None => return SourceType::Generic,
        };

        if self.social.iter().any(|p| matches_wildcard(p, &domain)) {
            return SourceType::Social;
        }

        if self.news.iter().any(|p| matches_wildcard(p, &domain)) {
            return SourceType::News;
        }

        let path_mentions_news = url
            .path_segments()
            .map(|mut segments| segments.any(|s| s.eq_ignore_ascii_case("news")))
            .unwrap_or(false);

        if domain.contains("news") || path_mentions_news {
            return SourceType::News;
        }

        SourceType::Generic
    }
}

impl Default for SourceClassifier {
    fn default() -> Self {
        Self::new()
    }
}
