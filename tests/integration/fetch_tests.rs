//! HTTP fetching and the built-in strategies against a wiremock server

use crate::common::{drain, job, test_config};
use std::sync::Arc;
use sumi_harvest::extract::{
    ExtractError, Extractor, FetchError, Fetcher, GenericExtractor, HttpFetcher, NewsExtractor,
};
use sumi_harvest::worker::Harvester;
use sumi_harvest::{storage, JobStatus, SourceType};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE: &str = r#"<html>
<head>
  <title>Markets rally as rates hold steady | Example News</title>
  <meta name="author" content="Jordan Lee">
  <meta property="article:published_time" content="2024-03-01T09:30:00Z">
</head>
<body>
  <nav>Home World Business</nav>
  <article>
    <h1>Markets rally as rates hold steady</h1>
    <p>Stocks climbed on Thursday after the central bank left interest rates unchanged.</p>
    <p>Analysts had widely expected the decision.</p>
    <img src="/images/trading-floor.jpg">
  </article>
  <footer>Copyright Example News</footer>
</body>
</html>"#;

fn fetcher(dir: &TempDir) -> HttpFetcher {
    let config = test_config(&dir.path().join("unused.db"), 1, 1);
    HttpFetcher::from_config(&config.user_agent, &config.fetch).unwrap()
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
}

#[tokio::test]
async fn test_fetch_sends_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header_regex("user-agent", r"^TestHarvester/1\.0 \(\+https://example\.com/about; admin@example\.com\)$"))
        .respond_with(html("<p>hi</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
    let page = fetcher(&dir).fetch(&url).await.unwrap();

    assert_eq!(page.status_code, 200);
    assert_eq!(page.body, "<p>hi</p>");
    assert_eq!(page.final_url, url);
}

#[tokio::test]
async fn test_fetch_rejects_error_status_and_non_html() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"{}".to_vec(), "application/json"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = fetcher(&dir);

    let missing = Url::parse(&format!("{}/missing", server.uri())).unwrap();
    assert_eq!(
        fetcher.fetch(&missing).await.unwrap_err(),
        FetchError::Status { code: 404 }
    );

    let json = Url::parse(&format!("{}/data.json", server.uri())).unwrap();
    assert_eq!(
        fetcher.fetch(&json).await.unwrap_err(),
        FetchError::ContentType("application/json".to_string())
    );
}

#[tokio::test]
async fn test_fetch_follows_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html("<html><body><p>moved here for good</p></body></html>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let strategy = GenericExtractor::new(Arc::new(fetcher(&dir)));
    let old = Url::parse(&format!("{}/old", server.uri())).unwrap();
    let content = strategy.extract(&old).await.unwrap();

    assert_eq!(content.clean_text, "moved here for good");
    assert_eq!(content.metadata["source_url"], old.as_str());
    assert_eq!(
        content.metadata["final_url"],
        format!("{}/new", server.uri()).as_str()
    );
    assert_eq!(content.metadata["method"], "generic");
}

#[tokio::test]
async fn test_news_strategy_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2024/03/markets"))
        .respond_with(html(ARTICLE))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let strategy = NewsExtractor::new(Arc::new(fetcher(&dir)));
    let url = Url::parse(&format!("{}/2024/03/markets", server.uri())).unwrap();
    let content = strategy.extract(&url).await.unwrap();

    assert!(content
        .clean_text
        .starts_with("Markets rally as rates hold steady"));
    assert!(content.clean_text.contains("left interest rates unchanged"));
    assert!(!content.clean_text.contains("Copyright"));

    let metadata = &content.metadata;
    assert_eq!(metadata["title"], "Markets rally as rates hold steady");
    assert_eq!(metadata["author"], "Jordan Lee");
    assert_eq!(metadata["publish_date"], "2024-03-01T09:30:00Z");
    assert_eq!(metadata["source_type"], "NEWS");
    assert_eq!(metadata["domain"], "127.0.0.1");
    assert_eq!(metadata["method"], "news");
    assert_eq!(
        metadata["image_urls"][0],
        format!("{}/images/trading-floor.jpg", server.uri()).as_str()
    );
}

#[tokio::test]
async fn test_fetch_errors_carry_through_strategy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let strategy = GenericExtractor::new(Arc::new(fetcher(&dir)));
    let url = Url::parse(&format!("{}/down", server.uri())).unwrap();

    assert_eq!(
        strategy.extract(&url).await.unwrap_err(),
        ExtractError::Fetch(FetchError::Status { code: 503 })
    );
}

/// Full stack: real HTTP fetcher, standard strategies, worker pool
#[tokio::test]
async fn test_harvest_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(html(ARTICLE))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&dir.path().join("harvest.db"), 2, 2);
    let harvester = Harvester::new(config).unwrap();
    let orchestrator = harvester.orchestrator();

    let article = orchestrator
        .submit(&format!("{}/article#comments", server.uri()), Some(SourceType::News))
        .unwrap();
    assert_eq!(article.url, format!("{}/article", server.uri()));
    let flaky = orchestrator
        .submit(&format!("{}/flaky", server.uri()), None)
        .unwrap();

    drain(&harvester).await;

    let article = job(orchestrator, article.id);
    assert_eq!(article.status, JobStatus::Completed);
    let result = orchestrator.get_result(article.id).unwrap();
    assert_eq!(result.metadata["title"], "Markets rally as rates hold steady");

    let flaky = job(orchestrator, flaky.id);
    assert_eq!(flaky.status, JobStatus::Failed);
    assert_eq!(flaky.source_type, Some(SourceType::Generic));
    assert_eq!(
        flaky.error_message.as_deref(),
        Some("fetch error after 2 attempts: fetch failed: HTTP status 500")
    );

    let storage = storage::lock(harvester.storage()).unwrap();
    assert_eq!(storage.count_jobs_by_status(JobStatus::Completed).unwrap(), 1);
    assert_eq!(storage.count_jobs_by_status(JobStatus::Failed).unwrap(), 1);
    assert_eq!(storage.queue_len().unwrap(), 0);
}
