//! Integration tests for sumi-harvest
//!
//! Every test runs against its own SQLite file in a temporary directory.
//! HTTP traffic goes to wiremock servers; worker behaviour is driven by
//! stub strategies.

mod common;
mod fetch_tests;
mod orchestrator_tests;
mod pool_tests;
