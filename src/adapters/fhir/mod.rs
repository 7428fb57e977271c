//! FHIR server adapter
//!
//! This module provides the HTTP side of extraction: a [`FhirClient`] that
//! fetches search pages, a token-bucket [`RateLimiter`], and the
//! [`CredentialProvider`] seam through which bearer credentials are supplied.

pub mod auth;
pub mod client;
pub mod rate_limit;

pub use auth::{Anonymous, CredentialProvider, StaticBearer};
pub use client::{classify_status, parse_retry_after, FhirClient};
pub use rate_limit::RateLimiter;
