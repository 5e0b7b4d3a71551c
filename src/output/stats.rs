//! Job statistics from the harvest database

use crate::state::{JobStatus, SourceType};
use crate::storage::{Storage, StorageResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// Snapshot of job counts
#[derive(Debug, Clone, Serialize)]
pub struct JobStatistics {
    /// Total number of jobs ever submitted
    pub total_jobs: u64,

    /// Count of jobs per status, keyed by the status name
    pub jobs_by_status: BTreeMap<String, u64>,

    /// Count of jobs per source type; jobs not yet classified are `UNCLASSIFIED`
    pub jobs_by_source: BTreeMap<String, u64>,

    /// Entries in the dispatch queue, including leased and delayed ones
    pub queue_depth: u64,
}

impl JobStatistics {
    pub fn count(&self, status: JobStatus) -> u64 {
        self.jobs_by_status
            .get(status.to_db_string())
            .copied()
            .unwrap_or(0)
    }
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<JobStatistics> {
    let total_jobs = storage.count_total_jobs()?;

    let mut jobs_by_status = BTreeMap::new();
    for status in JobStatus::all_states() {
        let count = storage.count_jobs_by_status(status)?;
        if count > 0 {
            jobs_by_status.insert(status.to_db_string().to_string(), count);
        }
    }

    let jobs_by_source = storage
        .count_jobs_by_source()?
        .into_iter()
        .map(|(source, count)| (source_label(source), count))
        .collect();

    Ok(JobStatistics {
        total_jobs,
        jobs_by_status,
        jobs_by_source,
        queue_depth: storage.queue_len()?,
    })
}

fn source_label(source: Option<SourceType>) -> String {
    match source {
        Some(source) => source.to_string(),
        None => "UNCLASSIFIED".to_string(),
    }
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &JobStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Total jobs: {}", stats.total_jobs);
    println!("  Queue depth: {}", stats.queue_depth);
    println!();

    println!("Jobs by Status:");
    let mut status_counts: Vec<_> = stats.jobs_by_status.iter().collect();
    status_counts.sort_by(|a, b| b.1.cmp(a.1));
    for (status, count) in status_counts {
        println!("  {}: {} ({:.1}%)", status, count, percent(*count, stats.total_jobs));
    }
    println!();

    if !stats.jobs_by_source.is_empty() {
        println!("Jobs by Source:");
        for (source, count) in &stats.jobs_by_source {
            println!("  {}: {}", source, count);
        }
        println!();
    }

    let completed = stats.count(JobStatus::Completed);
    let failed = stats.count(JobStatus::Failed);
    println!(
        "Success Rate: {:.1}% ({} completed / {} finished)",
        percent(completed, completed + failed),
        completed,
        completed + failed
    );
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}
