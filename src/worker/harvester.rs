//! Top-level wiring of storage, queue, orchestrator, strategies and workers

use crate::config::Config;
use crate::extract::{HttpFetcher, StrategyTable};
use crate::orchestrator::{Orchestrator, RetryPolicy};
use crate::storage::{self, SharedStorage};
use crate::url::SourceClassifier;
use crate::worker::{JobQueue, WorkerPool};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// A fully wired harvesting service over one database
pub struct Harvester {
    config: Config,
    storage: SharedStorage,
    queue: JobQueue,
    orchestrator: Arc<Orchestrator>,
    strategies: Arc<StrategyTable>,
}

impl Harvester {
    /// Opens the configured database and builds the standard strategies
    ///
    /// # Arguments
    ///
    /// * `config` - A validated configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Harvester)` - Ready to accept jobs and start workers
    /// * `Err(HarvestError)` - The database or HTTP client could not be set up
    pub fn new(config: Config) -> crate::Result<Self> {
        let storage = storage::open_shared(Path::new(&config.output.database_path))?;
        let fetcher = HttpFetcher::from_config(&config.user_agent, &config.fetch)?;
        let strategies = StrategyTable::standard(Arc::new(fetcher));
        Ok(Self::with_storage(config, storage, strategies))
    }

    /// Builds a harvester over an already opened storage
    pub fn with_storage(config: Config, storage: SharedStorage, strategies: StrategyTable) -> Self {
        let queue = JobQueue::new(storage.clone(), config.worker.visibility_timeout());
        let orchestrator = Orchestrator::new(
            storage.clone(),
            queue.clone(),
            RetryPolicy::from_config(&config.retry),
            SourceClassifier::from_config(&config),
        );

        Self {
            config,
            storage,
            queue,
            orchestrator: Arc::new(orchestrator),
            strategies: Arc::new(strategies),
        }
    }

    /// Replaces the strategy table used by workers started afterwards
    pub fn with_strategies(mut self, strategies: StrategyTable) -> Self {
        self.strategies = Arc::new(strategies);
        self
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Recovers jobs abandoned by a previous process, then starts the pool
    pub fn start(&self) -> crate::Result<WorkerPool> {
        let recovered = self
            .orchestrator
            .recover_stale(self.config.worker.stale_after())?;
        if !recovered.is_empty() {
            info!(jobs = ?recovered, "failed jobs left in PROCESSING by an earlier run");
        }

        Ok(WorkerPool::start(
            self.orchestrator.clone(),
            self.queue.clone(),
            self.strategies.clone(),
            &self.config.worker,
        ))
    }

    /// Runs workers until `signal` resolves, then shuts them down gracefully
    pub async fn run_until<F>(&self, signal: F) -> crate::Result<()>
    where
        F: Future<Output = ()>,
    {
        let pool = self.start()?;
        signal.await;
        info!("shutdown requested, waiting for in-flight jobs");
        pool.shutdown().await;
        Ok(())
    }

    /// Runs workers until no job is PENDING or PROCESSING
    pub async fn drain(&self) -> crate::Result<()> {
        let pool = self.start()?;
        let idle = pool.wait_until_idle().await;
        pool.shutdown().await;
        idle?;
        Ok(())
    }
}

/// Runs the harvester described by `config` until Ctrl-C
pub async fn run_harvest(config: Config) -> crate::Result<()> {
    let harvester = Harvester::new(config)?;
    harvester
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for Ctrl-C");
            }
        })
        .await
}
