//! URL handling module for Sumi-Harvest
//!
//! This module provides submission-time URL validation, domain extraction,
//! wildcard matching, and source-type classification.

mod classify;
mod validate;

// Re-export main functions
pub use classify::{extract_domain, matches_wildcard, SourceClassifier};
pub use validate::validate_job_url;
