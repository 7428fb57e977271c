//! Extraction coordinator
//!
//! Paginated, resumable retrieval of FHIR resources:
//!
//! - [`retry`] - explicit retry state machine with bounded exponential backoff
//! - [`bundle`] - search-set Bundle parsing (entries and `next` links)
//! - [`coordinator`] - [`Extractor`] / [`Extraction`], the lazy page stream and
//!   watermark accumulation

pub mod bundle;
pub mod coordinator;
pub mod retry;

pub use bundle::{parse_bundle, SearchBundle};
pub use coordinator::{ExtractedBatch, Extraction, Extractor, Page};
pub use retry::{RetryDecision, RetryPolicy, RetryState};
