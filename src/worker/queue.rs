//! Durable dispatch queue
//!
//! Entries live in the `queue` table, so nothing is lost across restarts.
//! A dequeue leases an entry instead of removing it: the entry is hidden for
//! the visibility timeout and comes back on its own unless acknowledged. A
//! consumer that dies between dequeue and claim therefore never loses a job.

use crate::storage::{self, JobId, QueueEntry, SharedStorage, StorageResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Handle to the shared job queue; cheap to clone
#[derive(Clone)]
pub struct JobQueue {
    storage: SharedStorage,
    wakeup: Arc<Notify>,
    visibility_timeout: Duration,
}

impl JobQueue {
    pub fn new(storage: SharedStorage, visibility_timeout: Duration) -> Self {
        Self {
            storage,
            wakeup: Arc::new(Notify::new()),
            visibility_timeout,
        }
    }

    /// Makes `job_id` visible to consumers at or after `not_before`
    pub fn enqueue(&self, job_id: JobId, not_before: DateTime<Utc>) -> StorageResult<()> {
        storage::lock(&self.storage)?.enqueue(job_id, not_before)?;
        self.notify();
        Ok(())
    }

    /// Leases the oldest visible entry, if any
    pub fn dequeue(&self) -> StorageResult<Option<QueueEntry>> {
        storage::lock(&self.storage)?.dequeue(Utc::now(), self.visibility_timeout)
    }

    /// Drops a leased entry once its job has been claimed
    pub fn ack(&self, entry: &QueueEntry) -> StorageResult<()> {
        storage::lock(&self.storage)?.ack(entry)
    }

    pub fn len(&self) -> StorageResult<u64> {
        storage::lock(&self.storage)?.queue_len()
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Wakes idle consumers so they re-check the queue
    pub fn notify(&self) {
        self.wakeup.notify_waiters();
    }

    /// Parks until notified or until `poll_interval` elapses
    ///
    /// Delayed entries never trigger a notification when they become
    /// visible, so the poll interval bounds how late a retry can start.
    pub async fn wait(&self, poll_interval: Duration) {
        tokio::select! {
            _ = self.wakeup.notified() => {}
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}
