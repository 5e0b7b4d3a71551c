//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{JobStatus, SourceType};
use crate::storage::{
    ContentRecord, JobId, JobRecord, QueueEntry, StatusUpdate, TransitionRecord,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every mutating method commits before it returns, so a successful return
/// means the change survives a process restart.
pub trait Storage: Send {
    // ===== Job Management =====

    /// Creates a PENDING job and its first queue entry in one transaction
    ///
    /// # Arguments
    ///
    /// * `url` - The validated, normalized URL
    /// * `source_type` - Caller-supplied source type, if any
    ///
    /// # Returns
    ///
    /// The newly created job record
    fn insert_job(&mut self, url: &str, source_type: Option<SourceType>)
        -> StorageResult<JobRecord>;

    /// Gets a job by ID
    fn get_job(&self, job_id: JobId) -> StorageResult<JobRecord>;

    /// Applies `update` only if the job is currently in `expected`
    ///
    /// Returns `Ok(false)` without touching anything when the job's status
    /// has moved on; the caller lost the race.
    fn update_job_status(
        &mut self,
        job_id: JobId,
        expected: JobStatus,
        update: &StatusUpdate<'_>,
    ) -> StorageResult<bool>;

    /// Gets all jobs in a given status, oldest first
    fn get_jobs_by_status(&self, status: JobStatus) -> StorageResult<Vec<JobRecord>>;

    /// Gets PROCESSING jobs whose last update is older than `cutoff`
    fn get_stale_jobs(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<JobRecord>>;

    /// Gets the full transition history of a job, oldest first
    fn get_transitions(&self, job_id: JobId) -> StorageResult<Vec<TransitionRecord>>;

    // ===== Content =====

    /// Gets the extracted content of a completed job
    fn get_content(&self, job_id: JobId) -> StorageResult<Option<ContentRecord>>;

    // ===== Queue Management =====

    /// Adds (or replaces) the queue entry for a job, visible from `not_before`
    fn enqueue(&mut self, job_id: JobId, not_before: DateTime<Utc>) -> StorageResult<()>;

    /// Leases the oldest visible entry for `lease`
    ///
    /// The entry stays in the queue, hidden until the lease expires, and is
    /// handed out again unless it is acknowledged first.
    fn dequeue(&mut self, now: DateTime<Utc>, lease: Duration)
        -> StorageResult<Option<QueueEntry>>;

    /// Removes a leased entry; a no-op if it was already replaced or removed
    fn ack(&mut self, entry: &QueueEntry) -> StorageResult<()>;

    /// Gets the queue entry for a job, if one exists
    fn get_queue_entry(&self, job_id: JobId) -> StorageResult<Option<QueueEntry>>;

    /// Gets the number of entries in the queue (visible or not)
    fn queue_len(&self) -> StorageResult<u64>;

    // ===== Statistics =====

    /// Counts jobs in a given status
    fn count_jobs_by_status(&self, status: JobStatus) -> StorageResult<u64>;

    /// Counts jobs per source type; unclassified jobs are keyed by `None`
    fn count_jobs_by_source(&self) -> StorageResult<HashMap<Option<SourceType>, u64>>;

    /// Gets the total number of jobs
    fn count_total_jobs(&self) -> StorageResult<u64>;
}
