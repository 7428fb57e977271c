//! Logging and observability
//!
//! This module provides structured logging with:
//! - Console output
//! - JSON-formatted file logs with rotation
//! - `RUST_LOG`-compatible filtering
//!
//! and a few macros that keep the field names of recurring events consistent.
//!
//! # Example
//!
//! ```no_run
//! use strata::logging::init_logging;
//! use strata::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(resource_type = "Observation", "Extraction started");
//! ```

pub mod structured;

// Re-export commonly used items
pub use structured::{init_logging, LoggingGuard};

/// Log the start of a resource type's run
///
/// # Example
///
/// ```no_run
/// use strata::log_run_start;
/// use strata::domain::ResourceType;
///
/// let rt = ResourceType::new("Observation").unwrap();
/// let watermark: Option<chrono::DateTime<chrono::Utc>> = None;
/// log_run_start!(&rt, watermark);
/// ```
#[macro_export]
macro_rules! log_run_start {
    ($resource_type:expr, $watermark:expr) => {
        tracing::info!(
            resource_type = %$resource_type,
            watermark = ?$watermark,
            "Starting resource type run"
        );
    };
}

/// Log the completion of a resource type's run
///
/// # Example
///
/// ```no_run
/// use strata::log_run_complete;
/// use std::time::Duration;
///
/// log_run_complete!("Observation", "success", 42, Duration::from_secs(3));
/// ```
#[macro_export]
macro_rules! log_run_complete {
    ($resource_type:expr, $status:expr, $written:expr, $duration:expr) => {
        tracing::info!(
            resource_type = %$resource_type,
            status = %$status,
            written = $written,
            duration_ms = $duration.as_millis() as u64,
            "Resource type run completed"
        );
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use strata::log_retry_attempt;
/// use std::time::Duration;
///
/// log_retry_attempt!(2, 4, Duration::from_millis(500), "Request timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $delay:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay.as_millis() as u64,
            reason = %$reason,
            "Retrying request"
        );
    };
}

/// Log a record excluded from output
///
/// # Example
///
/// ```no_run
/// use strata::log_record_rejected;
///
/// log_record_rejected!("Observation", Some("42"), "validated", "structural", 1);
/// ```
#[macro_export]
macro_rules! log_record_rejected {
    ($resource_type:expr, $resource_id:expr, $stage:expr, $kind:expr, $findings:expr) => {
        tracing::warn!(
            resource_type = %$resource_type,
            resource_id = ?$resource_id,
            stage = %$stage,
            kind = %$kind,
            findings = $findings,
            "Record rejected"
        );
    };
}
