//! Shared test utilities for docsum integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a `DocumentService` to an in-memory store
//! - Summarizer doubles for retry and back-pressure scenarios

pub mod harness;
pub mod summarizers;

pub use harness::TestHarness;
pub use summarizers::{FlakySummarizer, GateSummarizer};
