//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{JobStatus, SourceType};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    ContentRecord, JobId, JobRecord, QueueEntry, StatusUpdate, TransitionRecord,
};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const JOB_COLUMNS: &str = "id, url, source_type, status, attempt_count, created_at, updated_at, \
                           error_message, result_ref";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // FULL sync: a committed transition must survive power loss, not just a crash
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl ToSql for JobStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.to_db_string().into())
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        JobStatus::from_db_string(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown job status '{}'", s).into()))
    }
}

impl ToSql for SourceType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.to_db_string().into())
    }
}

impl FromSql for SourceType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        SourceType::from_db_string(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown source type '{}'", s).into()))
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        source_type: row.get(2)?,
        status: row.get(3)?,
        attempt_count: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        error_message: row.get(7)?,
        result_ref: row.get(8)?,
    })
}

fn queue_entry_from_row(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    let visible_at: i64 = row.get(3)?;
    Ok(QueueEntry {
        seq: row.get(0)?,
        job_id: row.get(1)?,
        deliveries: row.get(2)?,
        visible_at: millis_to_datetime(3, visible_at)?,
    })
}

fn millis_to_datetime(column: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(column, millis))
}

/// Inserts or replaces a job's queue entry; a replaced entry gets a new `seq`
fn enqueue_in(conn: &Connection, job_id: JobId, not_before: DateTime<Utc>) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO queue (job_id, visible_at, deliveries) VALUES (?1, ?2, 0)",
        params![job_id, not_before.timestamp_millis()],
    )?;
    Ok(())
}

fn record_transition(
    conn: &Connection,
    job_id: JobId,
    from: Option<JobStatus>,
    to: JobStatus,
    attempt: u32,
    detail: Option<&str>,
    at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO job_transitions (job_id, from_status, to_status, attempt, detail, at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![job_id, from, to, attempt, detail, at],
    )?;
    Ok(())
}

impl Storage for SqliteStorage {
    // ===== Job Management =====

    fn insert_job(
        &mut self,
        url: &str,
        source_type: Option<SourceType>,
    ) -> StorageResult<JobRecord> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO jobs (url, source_type, status, attempt_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            params![url, source_type, JobStatus::Pending, now],
        )?;
        let job_id = tx.last_insert_rowid();

        enqueue_in(&tx, job_id, now)?;
        record_transition(&tx, job_id, None, JobStatus::Pending, 0, None, now)?;
        tx.commit()?;

        Ok(JobRecord {
            id: job_id,
            url: url.to_string(),
            source_type,
            status: JobStatus::Pending,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
            error_message: None,
            result_ref: None,
        })
    }

    fn get_job(&self, job_id: JobId) -> StorageResult<JobRecord> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        self.conn
            .query_row(&sql, params![job_id], job_from_row)
            .optional()?
            .ok_or(StorageError::JobNotFound(job_id))
    }

    fn update_job_status(
        &mut self,
        job_id: JobId,
        expected: JobStatus,
        update: &StatusUpdate<'_>,
    ) -> StorageResult<bool> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;

        let changed = tx.execute(
            "UPDATE jobs SET status = ?1,
                 source_type = COALESCE(?2, source_type),
                 attempt_count = attempt_count + ?3,
                 error_message = ?4,
                 updated_at = ?5
             WHERE id = ?6 AND status = ?7
               AND (?8 IS NULL OR attempt_count = ?8)
               AND (?9 IS NULL OR EXISTS (SELECT 1 FROM queue WHERE seq = ?9 AND job_id = ?6))",
            params![
                update.to,
                update.source_type,
                u32::from(update.increment_attempts),
                update.error_message,
                now,
                job_id,
                expected,
                update.expected_attempt,
                update.delivery
            ],
        )?;

        if changed == 0 {
            return Ok(false);
        }

        if let Some(content) = update.content {
            let metadata = serde_json::to_string(&content.metadata)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            tx.execute(
                "INSERT INTO extracted_content (job_id, clean_text, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![job_id, content.clean_text, metadata, now],
            )?;
            let content_id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE jobs SET result_ref = ?1 WHERE id = ?2",
                params![content_id, job_id],
            )?;
        }

        if let Some(not_before) = update.requeue_at {
            enqueue_in(&tx, job_id, not_before)?;
        }

        let attempt: u32 = tx.query_row(
            "SELECT attempt_count FROM jobs WHERE id = ?1",
            params![job_id],
            |row| row.get(0),
        )?;
        record_transition(
            &tx,
            job_id,
            Some(expected),
            update.to,
            attempt,
            update.detail,
            now,
        )?;

        tx.commit()?;
        Ok(true)
    }

    fn get_jobs_by_status(&self, status: JobStatus) -> StorageResult<Vec<JobRecord>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE status = ?1 ORDER BY id",
            JOB_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![status], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn get_stale_jobs(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<JobRecord>> {
        let mut jobs = self.get_jobs_by_status(JobStatus::Processing)?;
        jobs.retain(|job| job.updated_at < cutoff);
        Ok(jobs)
    }

    fn get_transitions(&self, job_id: JobId) -> StorageResult<Vec<TransitionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT job_id, from_status, to_status, attempt, detail, at
             FROM job_transitions WHERE job_id = ?1 ORDER BY id",
        )?;
        let transitions = stmt
            .query_map(params![job_id], |row| {
                Ok(TransitionRecord {
                    job_id: row.get(0)?,
                    from: row.get(1)?,
                    to: row.get(2)?,
                    attempt: row.get(3)?,
                    detail: row.get(4)?,
                    at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transitions)
    }

    // ===== Content =====

    fn get_content(&self, job_id: JobId) -> StorageResult<Option<ContentRecord>> {
        let content = self
            .conn
            .query_row(
                "SELECT id, job_id, clean_text, metadata, created_at
                 FROM extracted_content WHERE job_id = ?1",
                params![job_id],
                |row| {
                    let raw: String = row.get(3)?;
                    let metadata = serde_json::from_str(&raw).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                    })?;
                    Ok(ContentRecord {
                        id: row.get(0)?,
                        job_id: row.get(1)?,
                        clean_text: row.get(2)?,
                        metadata,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(content)
    }

    // ===== Queue Management =====

    fn enqueue(&mut self, job_id: JobId, not_before: DateTime<Utc>) -> StorageResult<()> {
        enqueue_in(&self.conn, job_id, not_before)?;
        Ok(())
    }

    fn dequeue(
        &mut self,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> StorageResult<Option<QueueEntry>> {
        let now_ms = now.timestamp_millis();
        let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
        let tx = self.conn.transaction()?;

        let candidate = tx
            .query_row(
                "SELECT seq, job_id, deliveries, visible_at FROM queue
                 WHERE visible_at <= ?1 ORDER BY seq LIMIT 1",
                params![now_ms],
                queue_entry_from_row,
            )
            .optional()?;

        let Some(entry) = candidate else {
            return Ok(None);
        };

        let visible_at = now_ms.saturating_add(lease_ms);
        tx.execute(
            "UPDATE queue SET visible_at = ?1, deliveries = deliveries + 1 WHERE seq = ?2",
            params![visible_at, entry.seq],
        )?;
        tx.commit()?;

        Ok(Some(QueueEntry {
            deliveries: entry.deliveries + 1,
            visible_at: millis_to_datetime(3, visible_at)?,
            ..entry
        }))
    }

    fn ack(&mut self, entry: &QueueEntry) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM queue WHERE seq = ?1", params![entry.seq])?;
        Ok(())
    }

    fn get_queue_entry(&self, job_id: JobId) -> StorageResult<Option<QueueEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT seq, job_id, deliveries, visible_at FROM queue WHERE job_id = ?1",
                params![job_id],
                queue_entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn queue_len(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Statistics =====

    fn count_jobs_by_status(&self, status: JobStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_jobs_by_source(&self) -> StorageResult<HashMap<Option<SourceType>, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source_type, COUNT(*) FROM jobs GROUP BY source_type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, Option<SourceType>>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (source_type, count) = row?;
            counts.insert(source_type, count as u64);
        }
        Ok(counts)
    }

    fn count_total_jobs(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
