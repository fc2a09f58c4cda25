//! Integration tests for site-auditor
//!
//! End-to-end crawls against wiremock servers through the public API.

mod crawl_tests;
