//! Run orchestration
//!
//! Extraction Coordinator → structural validation → registry dispatch →
//! transformer → Write Coordinator, once per resource type. Every run yields a
//! [`RunManifest`] with per-type counts, per-kind failures and the rejects log.

pub mod manifest;
pub mod runner;

pub use manifest::{ResourceRunReport, RunManifest, RunStatus};
pub use runner::Pipeline;
