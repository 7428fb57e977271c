//! External system integrations for Strata.
//!
//! This module provides adapters for the collaborators around the core:
//!
//! - [`fhir`] - FHIR server search API (HTTP client, rate limiting, credentials)
//! - [`storage`] - output dataset and cursor state storage (trait-based)
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies and
//! enable testing with in-memory implementations. The core only sees the
//! [`storage::Dataset`], [`storage::StateStorage`] and
//! [`fhir::CredentialProvider`] traits plus the concrete [`fhir::FhirClient`].
//!
//! # FHIR Adapter
//!
//! ```rust,no_run
//! use strata::adapters::fhir::FhirClient;
//! use strata::config::FhirConfig;
//! use strata::domain::ResourceType;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FhirConfig {
//!     base_url: "https://fhir.example.com/r4".to_string(),
//!     ..FhirConfig::default()
//! };
//!
//! let client = FhirClient::from_config(&config)?;
//! let url = client.search_url(&ResourceType::new("Patient")?, &[("_count", "10".to_string())]);
//! let bundle = client.fetch_page(&url).await?;
//! # Ok(())
//! # }
//! ```

pub mod fhir;
pub mod storage;
