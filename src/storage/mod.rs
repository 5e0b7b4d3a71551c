//! Storage module for persisting jobs
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Job records and conditional (compare-and-swap) status updates
//! - Extracted content, written atomically with job completion
//! - The job transition history
//! - The durable dispatch queue with visibility-timeout leases

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::extract::ExtractedContent;
use crate::state::{JobStatus, SourceType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Primary key of a job
pub type JobId = i64;

/// Storage handle shared by the orchestrator, the queue and the workers
pub type SharedStorage = Arc<Mutex<dyn Storage>>;

/// Opens (or creates) the database at `path` and wraps it for sharing
pub fn open_shared(path: &Path) -> StorageResult<SharedStorage> {
    let storage = SqliteStorage::new(path)?;
    Ok(Arc::new(Mutex::new(storage)))
}

/// Locks a shared storage handle
///
/// A poisoned lock means a thread panicked mid-operation; the SQLite
/// transaction it held was rolled back, so the data is still consistent,
/// but the error is surfaced rather than silently recovered.
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, dyn Storage + 'static>> {
    storage
        .lock()
        .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))
}

/// Represents a job in the database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub url: String,
    /// `None` until classified at first claim
    pub source_type: Option<SourceType>,
    pub status: JobStatus,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set only in FAILED
    pub error_message: Option<String>,
    /// Set only in COMPLETED; id of the extracted content row
    pub result_ref: Option<i64>,
}

/// Represents stored extracted content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentRecord {
    pub id: i64,
    pub job_id: JobId,
    pub clean_text: String,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// One edge in a job's status history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord {
    pub job_id: JobId,
    /// `None` for the creation entry
    pub from: Option<JobStatus>,
    pub to: JobStatus,
    /// `attempt_count` after the transition
    pub attempt: u32,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// A leased queue entry
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Enqueue order; a re-enqueue gets a fresh value
    pub seq: i64,
    pub job_id: JobId,
    /// Number of times this entry has been handed out
    pub deliveries: u32,
    /// When the entry becomes visible again (lease expiry or `not_before`)
    pub visible_at: DateTime<Utc>,
}

/// The fields written by a conditional status update
///
/// Side effects (content insert, re-enqueue, history entry) are committed in
/// the same transaction as the status change, or not at all.
#[derive(Debug, Clone)]
pub struct StatusUpdate<'a> {
    pub to: JobStatus,
    /// Written only when `Some`; an existing value is never cleared
    pub source_type: Option<SourceType>,
    pub increment_attempts: bool,
    pub error_message: Option<&'a str>,
    pub content: Option<&'a ExtractedContent>,
    pub requeue_at: Option<DateTime<Utc>>,
    /// Free-form note stored in the transition history
    pub detail: Option<&'a str>,
    /// When `Some`, the update also requires this attempt count
    pub expected_attempt: Option<u32>,
    /// When `Some`, the update also requires this queue entry to still exist
    pub delivery: Option<i64>,
}

impl<'a> StatusUpdate<'a> {
    /// PENDING -> PROCESSING
    pub fn claim(source_type: SourceType) -> Self {
        Self {
            to: JobStatus::Processing,
            source_type: Some(source_type),
            increment_attempts: true,
            error_message: None,
            content: None,
            requeue_at: None,
            detail: None,
            expected_attempt: None,
            delivery: None,
        }
    }

    /// PROCESSING -> COMPLETED
    pub fn complete(content: &'a ExtractedContent) -> Self {
        Self {
            to: JobStatus::Completed,
            source_type: None,
            increment_attempts: false,
            error_message: None,
            content: Some(content),
            requeue_at: None,
            detail: None,
            expected_attempt: None,
            delivery: None,
        }
    }

    /// PROCESSING -> PENDING, visible again at `not_before`
    pub fn retry(not_before: DateTime<Utc>, detail: &'a str) -> Self {
        Self {
            to: JobStatus::Pending,
            source_type: None,
            increment_attempts: false,
            error_message: None,
            content: None,
            requeue_at: Some(not_before),
            detail: Some(detail),
            expected_attempt: None,
            delivery: None,
        }
    }

    /// PROCESSING -> FAILED
    pub fn fail(error_message: &'a str) -> Self {
        Self {
            to: JobStatus::Failed,
            source_type: None,
            increment_attempts: false,
            error_message: Some(error_message),
            content: None,
            requeue_at: None,
            detail: Some(error_message),
            expected_attempt: None,
            delivery: None,
        }
    }

    /// Restricts the update to the attempt the caller observed
    pub fn at_attempt(self, attempt: u32) -> Self {
        Self {
            expected_attempt: Some(attempt),
            ..self
        }
    }

    /// Restricts the update to the queue entry with sequence number `seq`
    ///
    /// A re-enqueue replaces the entry, so a delivery leased before the
    /// replacement no longer matches.
    pub fn for_delivery(self, seq: i64) -> Self {
        Self {
            delivery: Some(seq),
            ..self
        }
    }
}
