//! Job lifecycle orchestration
//!
//! The orchestrator is the only component that changes a job's status.
//! Every transition is a conditional update on the job's current status, so
//! concurrent callers racing on the same job see exactly one winner.
//!
//! ```text
//! submit ──► PENDING ──claim──► PROCESSING ──complete──► COMPLETED
//!               ▲                   │
//!               └──fail (retry)─────┤
//!                                   └──fail (exhausted)──► FAILED
//! ```

mod failure;
mod retry;

pub use failure::{FailureKind, JobFailure};
pub use retry::RetryPolicy;

use crate::extract::ExtractedContent;
use crate::state::{JobStatus, SourceType};
use crate::storage::{
    self, ContentRecord, JobId, JobRecord, QueueEntry, SharedStorage, StatusUpdate, StorageError,
    TransitionRecord,
};
use crate::url::{validate_job_url, SourceClassifier};
use crate::worker::JobQueue;
use crate::UrlError;
use chrono::Utc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Errors surfaced by orchestrator operations
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid job URL: {0}")]
    Validation(#[from] UrlError),

    #[error("job {job_id} is already claimed (status {status})")]
    AlreadyClaimed { job_id: JobId, status: JobStatus },

    #[error("job {0} was re-queued after this delivery was leased")]
    Superseded(JobId),

    #[error("job {job_id} is in terminal state {status}")]
    TerminalState { job_id: JobId, status: JobStatus },

    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {job_id} is not ready (status {status})")]
    NotReady { job_id: JobId, status: JobStatus },

    #[error("storage unavailable: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for OrchestratorError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::JobNotFound(id) => OrchestratorError::NotFound(id),
            other => OrchestratorError::Storage(other),
        }
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Owns the job state machine
pub struct Orchestrator {
    storage: SharedStorage,
    queue: JobQueue,
    retry: RetryPolicy,
    classifier: SourceClassifier,
}

impl Orchestrator {
    pub fn new(
        storage: SharedStorage,
        queue: JobQueue,
        retry: RetryPolicy,
        classifier: SourceClassifier,
    ) -> Self {
        Self {
            storage,
            queue,
            retry,
            classifier,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Creates a PENDING job and makes it available to workers
    ///
    /// The URL is validated and normalized first; nothing is written for an
    /// invalid URL.
    pub fn submit(
        &self,
        url: &str,
        source_type: Option<SourceType>,
    ) -> OrchestratorResult<JobRecord> {
        let url = validate_job_url(url)?;
        let job = storage::lock(&self.storage)?.insert_job(url.as_str(), source_type)?;

        info!(job_id = job.id, url = %job.url, source_type = ?source_type, "job submitted");
        self.queue.notify();
        Ok(job)
    }

    /// Marks a PENDING job as PROCESSING on behalf of a worker
    ///
    /// Classifies the job first if it has no source type; the classification
    /// is stored with the transition. Each successful claim counts as one
    /// attempt.
    pub fn claim(&self, job_id: JobId) -> OrchestratorResult<JobRecord> {
        self.claim_with(job_id, None)
    }

    /// Claims the job behind a leased queue entry
    ///
    /// Fails with `Superseded` when the job was re-queued after `entry` was
    /// leased, so a late redelivery cannot start a retry before its backoff
    /// delay.
    pub fn claim_delivery(&self, entry: &QueueEntry) -> OrchestratorResult<JobRecord> {
        self.claim_with(entry.job_id, Some(entry.seq))
    }

    fn claim_with(&self, job_id: JobId, delivery: Option<i64>) -> OrchestratorResult<JobRecord> {
        let job = self.get_job(job_id)?;
        check_source(&job, JobStatus::Pending, JobStatus::Processing)?;

        let source_type = match job.source_type {
            Some(source_type) => source_type,
            None => {
                let url = Url::parse(&job.url).map_err(|e| UrlError::Parse(e.to_string()))?;
                let classified = self.classifier.classify(&url);
                debug!(job_id, source_type = %classified, "classified job");
                classified
            }
        };

        let mut update = StatusUpdate::claim(source_type).at_attempt(job.attempt_count);
        if let Some(seq) = delivery {
            update = update.for_delivery(seq);
        }
        let job = match self.transition(job_id, JobStatus::Pending, &update) {
            // still PENDING, but no longer the job this claim was based on
            Err(OrchestratorError::AlreadyClaimed {
                status: JobStatus::Pending,
                ..
            }) => return Err(OrchestratorError::Superseded(job_id)),
            other => other?,
        };
        debug!(job_id, attempt = job.attempt_count, "job claimed");
        Ok(job)
    }

    /// Records a successful extraction: PROCESSING -> COMPLETED
    ///
    /// The content row and the status change commit together.
    pub fn complete(
        &self,
        job_id: JobId,
        content: &ExtractedContent,
    ) -> OrchestratorResult<JobRecord> {
        let job = self.get_job(job_id)?;
        check_source(&job, JobStatus::Processing, JobStatus::Completed)?;

        let update = StatusUpdate::complete(content).at_attempt(job.attempt_count);
        let job = self.transition(job_id, JobStatus::Processing, &update)?;
        info!(
            job_id,
            attempt = job.attempt_count,
            chars = content.clean_text.len(),
            "job completed"
        );
        Ok(job)
    }

    /// Records a failed attempt
    ///
    /// Goes back to PENDING with a backoff delay while attempts remain,
    /// otherwise to FAILED with a summary of the last failure.
    pub fn fail(&self, job_id: JobId, failure: &JobFailure) -> OrchestratorResult<JobRecord> {
        let job = self.get_job(job_id)?;
        let attempts = job.attempt_count;

        let retrying = self.retry.should_retry(attempts);
        let target = if retrying {
            JobStatus::Pending
        } else {
            JobStatus::Failed
        };
        check_source(&job, JobStatus::Processing, target)?;

        let detail = failure.to_string();
        let final_message = failure.final_message(attempts);
        let not_before = self.retry.not_before(attempts, Utc::now());
        let update = if retrying {
            StatusUpdate::retry(not_before, &detail)
        } else {
            StatusUpdate::fail(&final_message)
        };

        let job = self.transition(job_id, JobStatus::Processing, &update.at_attempt(attempts))?;

        if retrying {
            warn!(
                job_id,
                attempt = attempts,
                max_attempts = self.retry.max_attempts,
                retry_at = %not_before,
                error = %failure,
                "attempt failed, will retry"
            );
            self.queue.notify();
        } else {
            warn!(job_id, attempts, error = %failure, "job failed");
        }
        Ok(job)
    }

    /// Applies a conditional update and returns the job as written
    ///
    /// The storage lock is held only for the update itself; the status and
    /// attempt guard in the update decide which of several callers wins.
    fn transition(
        &self,
        job_id: JobId,
        expected: JobStatus,
        update: &StatusUpdate<'_>,
    ) -> OrchestratorResult<JobRecord> {
        let mut storage = storage::lock(&self.storage)?;
        let applied = storage.update_job_status(job_id, expected, update)?;
        let job = storage.get_job(job_id)?;
        drop(storage);

        if applied {
            Ok(job)
        } else {
            Err(lost_race(job, update.to))
        }
    }

    /// Current snapshot of a job, in any state
    pub fn get_job(&self, job_id: JobId) -> OrchestratorResult<JobRecord> {
        Ok(storage::lock(&self.storage)?.get_job(job_id)?)
    }

    /// Extracted content of a COMPLETED job
    pub fn get_result(&self, job_id: JobId) -> OrchestratorResult<ContentRecord> {
        let storage = storage::lock(&self.storage)?;
        let job = storage.get_job(job_id)?;
        if job.status != JobStatus::Completed {
            return Err(OrchestratorError::NotReady {
                job_id,
                status: job.status,
            });
        }
        storage
            .get_content(job_id)?
            .ok_or(OrchestratorError::NotFound(job_id))
    }

    /// Every status change of a job, oldest first
    pub fn history(&self, job_id: JobId) -> OrchestratorResult<Vec<TransitionRecord>> {
        let storage = storage::lock(&self.storage)?;
        storage.get_job(job_id)?;
        Ok(storage.get_transitions(job_id)?)
    }

    /// Fails jobs stuck in PROCESSING for longer than `older_than`
    ///
    /// A worker that dies after claiming leaves its job PROCESSING with no
    /// queue entry. Such jobs go through the regular `fail` transition, so
    /// they retry or terminate like any other failure.
    pub fn recover_stale(&self, older_than: Duration) -> OrchestratorResult<Vec<JobId>> {
        let age = chrono::Duration::from_std(older_than)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = Utc::now() - age;
        let stale = storage::lock(&self.storage)?.get_stale_jobs(cutoff)?;

        let mut recovered = Vec::new();
        for job in stale {
            match self.fail(job.id, &JobFailure::interrupted()) {
                Ok(_) => recovered.push(job.id),
                // finished between the scan and the update
                Err(OrchestratorError::InvalidTransition { .. })
                | Err(OrchestratorError::TerminalState { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        if !recovered.is_empty() {
            info!(count = recovered.len(), "recovered stale jobs");
        }
        Ok(recovered)
    }

    /// Number of jobs that have not reached a terminal state
    pub fn active_count(&self) -> OrchestratorResult<u64> {
        let storage = storage::lock(&self.storage)?;
        let mut count = 0;
        for status in JobStatus::all_states() {
            if status.is_active() {
                count += storage.count_jobs_by_status(status)?;
            }
        }
        Ok(count)
    }
}

/// Checks that `job` may take the `expected -> to` edge
fn check_source(job: &JobRecord, expected: JobStatus, to: JobStatus) -> OrchestratorResult<()> {
    if job.status == expected && expected.can_transition_to(to) {
        return Ok(());
    }
    Err(transition_error(job, to))
}

fn transition_error(job: &JobRecord, to: JobStatus) -> OrchestratorError {
    if job.status.is_terminal() {
        OrchestratorError::TerminalState {
            job_id: job.id,
            status: job.status,
        }
    } else if to == JobStatus::Processing {
        OrchestratorError::AlreadyClaimed {
            job_id: job.id,
            status: job.status,
        }
    } else {
        OrchestratorError::InvalidTransition {
            job_id: job.id,
            from: job.status,
            to,
        }
    }
}

/// The conditional update matched nothing: someone else moved the job first
fn lost_race(current: JobRecord, to: JobStatus) -> OrchestratorError {
    debug!(job_id = current.id, status = %current.status, "lost transition race");
    transition_error(&current, to)
}
