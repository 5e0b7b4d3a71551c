use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::config::{parse_config, Config};
use sumi_harvest::extract::{ExtractError, ExtractedContent, Extractor, StrategyTable};
use sumi_harvest::orchestrator::Orchestrator;
use sumi_harvest::storage::{self, JobId, JobRecord};
use sumi_harvest::worker::Harvester;
use sumi_harvest::{JobStatus, SourceType};
use tempfile::TempDir;
use url::Url;

/// A configuration with short timings, pointing at `db_path`
pub fn test_config(db_path: &Path, max_attempts: u32, concurrency: u32) -> Config {
    parse_config(&format!(
        r#"
[worker]
concurrency = {concurrency}
job-timeout-secs = 1
poll-interval-ms = 20
visibility-timeout-secs = 5
stale-after-secs = 2

[retry]
max-attempts = {max_attempts}
base-delay-ms = 10
max-delay-ms = 50

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[fetch]
timeout-secs = 5
connect-timeout-secs = 2

[output]
database-path = "{db}"
"#,
        concurrency = concurrency,
        max_attempts = max_attempts,
        db = db_path.display(),
    ))
    .expect("test config should be valid")
}

/// A harvester over a fresh database in its own temp dir
pub fn harvester(strategies: StrategyTable, max_attempts: u32, concurrency: u32) -> (Harvester, TempDir) {
    let dir = TempDir::new().unwrap();
    let harvester = harvester_at(dir.path(), strategies, max_attempts, concurrency);
    (harvester, dir)
}

/// A harvester over the database in `dir`, created if missing
pub fn harvester_at(
    dir: &Path,
    strategies: StrategyTable,
    max_attempts: u32,
    concurrency: u32,
) -> Harvester {
    let db_path = dir.join("harvest.db");
    let config = test_config(&db_path, max_attempts, concurrency);
    let storage = storage::open_shared(&db_path).unwrap();
    Harvester::with_storage(config, storage, strategies)
}

/// Binds every source type to `strategy`
pub fn table_with<E: Extractor + 'static>(strategy: Arc<E>) -> StrategyTable {
    let strategy: Arc<dyn Extractor> = strategy;
    let mut table = StrategyTable::new();
    for source_type in SourceType::all() {
        table.register(source_type, strategy.clone());
    }
    table
}

/// Drains the queue, failing the test if it takes unreasonably long
pub async fn drain(harvester: &Harvester) {
    tokio::time::timeout(Duration::from_secs(20), harvester.drain())
        .await
        .expect("drain timed out")
        .unwrap();
}

/// The sequence of statuses a job has been in, creation first
pub fn status_sequence(orchestrator: &Orchestrator, job_id: JobId) -> Vec<JobStatus> {
    orchestrator
        .history(job_id)
        .unwrap()
        .into_iter()
        .map(|entry| entry.to)
        .collect()
}

pub fn job(orchestrator: &Orchestrator, job_id: JobId) -> JobRecord {
    orchestrator.get_job(job_id).unwrap()
}

/// Always succeeds with the same text
pub struct Succeeds(pub &'static str);

#[async_trait]
impl Extractor for Succeeds {
    fn name(&self) -> &'static str {
        "succeeds"
    }

    async fn extract(&self, url: &Url) -> Result<ExtractedContent, ExtractError> {
        Ok(ExtractedContent::new(self.0).with("source_url", url.as_str()))
    }
}

/// Always fails
pub struct AlwaysFails;

#[async_trait]
impl Extractor for AlwaysFails {
    fn name(&self) -> &'static str {
        "always-fails"
    }

    async fn extract(&self, _url: &Url) -> Result<ExtractedContent, ExtractError> {
        Err(ExtractError::Other("boom".to_string()))
    }
}

/// Fails a fixed number of times, then succeeds
pub struct FailsThenSucceeds {
    remaining_failures: AtomicU32,
}

impl FailsThenSucceeds {
    pub fn new(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl Extractor for FailsThenSucceeds {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn extract(&self, _url: &Url) -> Result<ExtractedContent, ExtractError> {
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(ExtractError::EmptyContent)
        } else {
            Ok(ExtractedContent::new("finally"))
        }
    }
}

/// Never finishes on its own
pub struct Hangs;

#[async_trait]
impl Extractor for Hangs {
    fn name(&self) -> &'static str {
        "hangs"
    }

    async fn extract(&self, _url: &Url) -> Result<ExtractedContent, ExtractError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ExtractedContent::new("unreachable"))
    }
}

/// Panics on every call
pub struct Panics;

#[async_trait]
impl Extractor for Panics {
    fn name(&self) -> &'static str {
        "panics"
    }

    async fn extract(&self, _url: &Url) -> Result<ExtractedContent, ExtractError> {
        panic!("strategy exploded")
    }
}

/// Sleeps for a while and records how many calls overlap
pub struct Slow {
    delay: Duration,
    running: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl Slow {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Extractor for Slow {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn extract(&self, _url: &Url) -> Result<ExtractedContent, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(ExtractedContent::new("slow but done"))
    }
}
