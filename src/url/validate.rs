use crate::UrlError;
use url::{form_urlencoded, Url};

/// Query parameters that only carry click tracking
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "igshid"];

/// Validates a submitted job URL and returns its canonical form
///
/// # Rules
///
/// 1. Surrounding whitespace is ignored
/// 2. The URL must be absolute (relative input like `not-a-url` is rejected)
/// 3. Scheme must be `http` or `https`
/// 4. A host must be present
/// 5. The fragment is dropped, tracking parameters (`utm_*`, `fbclid`, ...)
///    are removed, the order of remaining parameters is kept
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::validate_job_url;
///
/// let url = validate_job_url("https://Example.com/a?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/a");
///
/// assert!(validate_job_url("not-a-url").is_err());
/// ```
pub fn validate_job_url(input: &str) -> Result<Url, UrlError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UrlError::Parse("empty URL".to_string()));
    }

    let mut url = Url::parse(input).map_err(|e| UrlError::Parse(format!("{}: {}", input, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    url.set_fragment(None);

    if let Some(query) = url.query() {
        // segments are kept as submitted; only the decoded key is inspected
        let segments: Vec<&str> = query.split('&').collect();
        let kept: Vec<&str> = segments
            .iter()
            .copied()
            .filter(|segment| !is_tracking_segment(segment))
            .collect();

        if kept.len() < segments.len() {
            let kept = kept.join("&");
            if kept.is_empty() {
                url.set_query(None);
            } else {
                url.set_query(Some(&kept));
            }
        }
    }

    Ok(url)
}

fn is_tracking_segment(segment: &str) -> bool {
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .map_or(false, |(key, _)| is_tracking_param(&key))
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
