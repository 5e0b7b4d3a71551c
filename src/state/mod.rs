//! State module for tracking job progress
//!
//! # Components
//!
//! - `JobStatus`: The job lifecycle states and the edges allowed between them
//! - `SourceType`: The closed set of source classifications driving strategy selection

mod job_status;
mod source_type;

// Re-export main types
pub use job_status::JobStatus;
pub use source_type::SourceType;
