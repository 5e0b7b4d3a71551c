//! Reporting for the CLI
//!
//! Summaries are read straight from storage, so they work against a
//! database whose workers are still running.

pub mod stats;

pub use stats::{load_statistics, print_statistics, JobStatistics};
