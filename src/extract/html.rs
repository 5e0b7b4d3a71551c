//! HTML helpers shared by the extraction strategies
//!
//! Thin wrappers over `scraper` for the selector-cascade lookups every
//! strategy does: first match wins, attribute before text, empty means miss.

use crate::extract::ExtractError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Tags whose text never counts as page content
pub const BOILERPLATE_TAGS: &[&str] = &["script", "style", "noscript", "nav", "footer", "aside"];

/// Collapses all runs of whitespace to single spaces and trims
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn parse_selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Parse(format!("selector '{}': {:?}", css, e)))
}

pub fn pattern(re: &str) -> Result<Regex, ExtractError> {
    Regex::new(re).map_err(|e| ExtractError::Parse(e.to_string()))
}

/// Text of an element, skipping anything nested inside one of `excluded`
pub fn text_excluding(element: ElementRef<'_>, excluded: &[&str]) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map_or(false, |e| excluded.contains(&e.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}

/// Whole-document text with boilerplate removed
pub fn page_text(document: &Html, excluded: &[&str]) -> String {
    text_excluding(document.root_element(), excluded)
}

/// An element's `content` attribute (for `<meta>`), else its trimmed text
pub fn value_of(element: ElementRef<'_>, attrs: &[&str]) -> Option<String> {
    attrs
        .iter()
        .find_map(|attr| element.value().attr(attr))
        .map(str::to_string)
        .or_else(|| Some(element.text().collect::<String>()))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Runs each selector in order and returns the first non-empty value
pub fn first_value(
    document: &Html,
    selectors: &[&str],
    attrs: &[&str],
) -> Result<Option<String>, ExtractError> {
    for css in selectors {
        let selector = parse_selector(css)?;
        if let Some(value) = document
            .select(&selector)
            .next()
            .and_then(|element| value_of(element, attrs))
        {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Like [`first_value`] but only accepts values passing `accept`
pub fn first_value_where(
    document: &Html,
    selectors: &[&str],
    attrs: &[&str],
    accept: impl Fn(&str) -> bool,
) -> Result<Option<String>, ExtractError> {
    for css in selectors {
        let selector = parse_selector(css)?;
        if let Some(value) = document
            .select(&selector)
            .next()
            .and_then(|element| value_of(element, attrs))
            .filter(|value| accept(value))
        {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Resolves `src` against `base`, dropping anything that is not http(s)
pub fn absolute_url(base: &Url, src: &str) -> Option<String> {
    let resolved = base.join(src.trim()).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

/// Appends `value` unless already present, preserving first-seen order
pub fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}
