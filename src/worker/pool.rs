//! Worker pool
//!
//! A fixed number of tokio tasks, each running the loop
//!
//! ```text
//! dequeue ─► claim ─► ack ─► select strategy ─► extract (timeout) ─► complete | fail
//! ```
//!
//! Every extraction runs in its own task, so a panicking or hung strategy
//! only fails its own job. A separate reaper task periodically fails jobs
//! abandoned in PROCESSING.

use crate::config::WorkerConfig;
use crate::extract::{ExtractedContent, StrategyTable};
use crate::orchestrator::{FailureKind, JobFailure, Orchestrator, OrchestratorError};
use crate::state::SourceType;
use crate::storage::{JobRecord, QueueEntry};
use crate::worker::JobQueue;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

/// Handle to a running set of workers
pub struct WorkerPool {
    orchestrator: Arc<Orchestrator>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    poll_interval: Duration,
}

impl WorkerPool {
    /// Spawns `config.concurrency` workers plus the stale-job reaper
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        orchestrator: Arc<Orchestrator>,
        queue: JobQueue,
        strategies: Arc<StrategyTable>,
        config: &WorkerConfig,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(config.concurrency as usize + 1);

        for id in 0..config.concurrency {
            let worker = Worker {
                id,
                orchestrator: orchestrator.clone(),
                queue: queue.clone(),
                strategies: strategies.clone(),
                job_timeout: config.job_timeout(),
                poll_interval: config.poll_interval(),
            };
            handles.push(tokio::spawn(worker.run(shutdown_rx.clone())));
        }

        handles.push(tokio::spawn(reap_stale(
            orchestrator.clone(),
            config.stale_after(),
            reap_period(config),
            shutdown_rx,
        )));

        info!(
            workers = config.concurrency,
            job_timeout = ?config.job_timeout(),
            "worker pool started"
        );

        Self {
            orchestrator,
            shutdown,
            handles,
            poll_interval: config.poll_interval(),
        }
    }

    /// Resolves once no job is PENDING or PROCESSING
    ///
    /// Jobs waiting out a retry backoff count as pending.
    pub async fn wait_until_idle(&self) -> Result<(), OrchestratorError> {
        loop {
            if self.orchestrator.active_count()? == 0 {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Stops taking new jobs and waits for in-flight ones to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
        info!("worker pool stopped");
    }
}

/// Check a few times per staleness window, but never faster than polling
fn reap_period(config: &WorkerConfig) -> Duration {
    (config.stale_after() / 4).max(config.poll_interval())
}

struct Worker {
    id: u32,
    orchestrator: Arc<Orchestrator>,
    queue: JobQueue,
    strategies: Arc<StrategyTable>,
    job_timeout: Duration,
    poll_interval: Duration,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(worker = self.id, "worker started");

        while !*shutdown.borrow() {
            match self.queue.dequeue() {
                Ok(Some(entry)) => self.handle(entry).await,
                Ok(None) => {
                    tokio::select! {
                        changed = shutdown.changed() => if changed.is_err() { break },
                        _ = self.queue.wait(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    warn!(worker = self.id, error = %e, "dequeue failed");
                    tokio::select! {
                        changed = shutdown.changed() => if changed.is_err() { break },
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        debug!(worker = self.id, "worker stopped");
    }

    async fn handle(&self, entry: QueueEntry) {
        let job_id = entry.job_id;

        let job = match self.orchestrator.claim_delivery(&entry) {
            Ok(job) => job,
            // duplicate or late delivery; the entry has nothing left to do
            Err(
                e @ (OrchestratorError::AlreadyClaimed { .. }
                | OrchestratorError::Superseded(_)
                | OrchestratorError::TerminalState { .. }
                | OrchestratorError::NotFound(_)),
            ) => {
                debug!(worker = self.id, job_id, reason = %e, "dropping queue entry");
                self.ack(&entry);
                return;
            }
            Err(e) => {
                // leave the entry leased; it is redelivered after the visibility timeout
                warn!(worker = self.id, job_id, error = %e, "claim failed");
                return;
            }
        };
        self.ack(&entry);

        debug!(
            worker = self.id,
            job_id,
            attempt = job.attempt_count,
            deliveries = entry.deliveries,
            "processing job"
        );

        let reported = match self.execute(&job).await {
            Ok(content) => self.orchestrator.complete(job_id, &content).map(drop),
            Err(failure) => self.orchestrator.fail(job_id, &failure).map(drop),
        };
        if let Err(e) = reported {
            // the job stays PROCESSING until the reaper fails it
            error!(worker = self.id, job_id, error = %e, "could not record job outcome");
        }
    }

    fn ack(&self, entry: &QueueEntry) {
        if let Err(e) = self.queue.ack(entry) {
            warn!(worker = self.id, job_id = entry.job_id, error = %e, "ack failed");
        }
    }

    async fn execute(&self, job: &JobRecord) -> Result<ExtractedContent, JobFailure> {
        // claim always stores a source type
        let source_type = job.source_type.unwrap_or(SourceType::Generic);
        let strategy = self.strategies.get(source_type).ok_or_else(|| {
            JobFailure::new(
                FailureKind::Extraction,
                format!("no strategy registered for {}", source_type),
            )
        })?;
        let url = Url::parse(&job.url)
            .map_err(|e| JobFailure::new(FailureKind::Extraction, e.to_string()))?;

        debug!(worker = self.id, job_id = job.id, strategy = strategy.name(), "running strategy");
        let mut task = tokio::spawn(async move { strategy.extract(&url).await });

        match tokio::time::timeout(self.job_timeout, &mut task).await {
            Ok(Ok(Ok(content))) => Ok(content),
            Ok(Ok(Err(e))) => Err(JobFailure::from(e)),
            Ok(Err(join_error)) if join_error.is_panic() => Err(JobFailure::new(
                FailureKind::Panicked,
                panic_message(join_error.into_panic()),
            )),
            Ok(Err(join_error)) => Err(JobFailure::new(
                FailureKind::Panicked,
                join_error.to_string(),
            )),
            Err(_) => {
                task.abort();
                Err(JobFailure::timeout(self.job_timeout))
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("strategy panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("strategy panicked: {}", s)
    } else {
        "strategy panicked".to_string()
    }
}

async fn reap_stale(
    orchestrator: Arc<Orchestrator>,
    stale_after: Duration,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);

    while !*shutdown.borrow() {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if let Err(e) = orchestrator.recover_stale(stale_after) {
            warn!(error = %e, "stale job recovery failed");
        }
    }
}
