//! Domain error types
//!
//! This module defines the error hierarchy for Strata. Errors are domain-specific
//! and don't expose third-party types; HTTP and storage failures are translated
//! into [`ExtractError`] and [`StorageError`] at the adapter boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Main Strata error type
///
/// This is the primary error type used throughout the crate. Every variant maps
/// onto one [`ErrorKind`] so run manifests can count failures per kind.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A record failed basic shape checks
    #[error("Structural error: {0}")]
    Structural(String),

    /// A mapping expression failed for one record
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Rows diverge from the pinned schema
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Extraction (FHIR API) errors
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractError),

    /// Dataset or state storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Cursor/state management errors
    #[error("State management error: {0}")]
    State(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl StrataError {
    /// Classify this error for reporting and propagation decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            StrataError::Structural(_) => ErrorKind::Structural,
            StrataError::Mapping(_) => ErrorKind::Mapping,
            StrataError::SchemaViolation(_) => ErrorKind::SchemaViolation,
            StrataError::Extraction(e) if e.root_is_transient() => ErrorKind::TransientIo,
            StrataError::Extraction(_) => ErrorKind::FatalIo,
            StrataError::Storage(e) if e.is_transient() => ErrorKind::TransientIo,
            StrataError::Storage(_) | StrataError::State(_) | StrataError::Io(_) => {
                ErrorKind::FatalIo
            }
            StrataError::Configuration(_)
            | StrataError::Serialization(_)
            | StrataError::Other(_) => ErrorKind::Other,
        }
    }
}

/// Failure classification used by manifests and the rejects log
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Record failed basic shape checks; excluded, not retried
    Structural,
    /// An expression failed for one record; that record is isolated
    Mapping,
    /// A business rule failed at `FAIL` level
    Validation,
    /// Row columns diverge from the pinned schema; the batch write is rejected
    SchemaViolation,
    /// Network/storage timeout that was retried up to its bound
    TransientIo,
    /// Authentication failure or non-retryable status
    FatalIo,
    /// No transformer or mapping exists for the resource type
    NotSupported,
    /// Anything else (configuration, serialization)
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Structural => "structural",
            ErrorKind::Mapping => "mapping",
            ErrorKind::Validation => "validation",
            ErrorKind::SchemaViolation => "schema_violation",
            ErrorKind::TransientIo => "transient_io",
            ErrorKind::FatalIo => "fatal_io",
            ErrorKind::NotSupported => "not_supported",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// FHIR API extraction errors
///
/// Errors that occur when talking to the source FHIR server. These errors don't
/// expose the HTTP client's types. [`ExtractError::is_transient`] decides whether
/// the retry state machine may try again.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Request timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Failed to connect to the FHIR server
    #[error("Failed to connect to FHIR server: {0}")]
    Connection(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
        /// Server-provided retry hint
        retry_after: Option<Duration>,
    },

    /// Rate limit signalled by the server (429)
    #[error("Rate limit exceeded, retry after: {retry_after:?}")]
    RateLimited {
        /// Server-provided retry hint
        retry_after: Option<Duration>,
    },

    /// Client error (4xx other than 401/403/429)
    #[error("Client error: {status} - {message}")]
    ClientError {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Authentication failed (401/403 or credential supplier failure)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Response body could not be understood
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    /// The retry budget for one request ran out
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// The last transient error observed
        last: Box<ExtractError>,
    },
}

impl ExtractError {
    /// Whether the error may succeed if the same request is retried
    pub fn is_transient(&self) -> bool {
        match self {
            ExtractError::Timeout(_)
            | ExtractError::Connection(_)
            | ExtractError::ServerError { .. }
            | ExtractError::RateLimited { .. } => true,
            ExtractError::RetriesExhausted { .. }
            | ExtractError::ClientError { .. }
            | ExtractError::Authentication(_)
            | ExtractError::InvalidResponse(_) => false,
        }
    }

    /// Server-provided retry hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ExtractError::ServerError { retry_after, .. }
            | ExtractError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether the root cause of this error was transient
    ///
    /// Exhausted retries are reported as transient I/O in manifests even though
    /// they are no longer retryable.
    pub fn root_is_transient(&self) -> bool {
        match self {
            ExtractError::RetriesExhausted { last, .. } => last.is_transient(),
            other => other.is_transient(),
        }
    }
}

/// Dataset and state storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Writing to the dataset or state store failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Reading from the dataset or state store failed
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// Storage operation timed out
    #[error("Storage timeout: {0}")]
    Timeout(String),

    /// Stored data could not be decoded
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),
}

impl StorageError {
    /// Whether the storage operation may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Timeout(_))
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for StrataError {
    fn from(err: std::io::Error) -> Self {
        StrataError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for StrataError {
    fn from(err: toml::de::Error) -> Self {
        StrataError::Configuration(format!("TOML parse error: {err}"))
    }
}
