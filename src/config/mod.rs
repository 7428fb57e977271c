//! Configuration management for Strata.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! Strata uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `STRATA_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Per-section validation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use strata::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("strata.toml")?;
//!
//! println!("FHIR URL: {}", config.fhir.base_url);
//! println!("Specs: {}", config.mapping.spec_dir.display());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - log level, dry run
//! - [`FhirConfig`] - server URL, bearer token, paging, [`RetryConfig`], [`RateLimitConfig`]
//! - [`MappingConfig`] - spec directory, resource type selection, path cache size
//! - [`StorageConfig`] - silver dataset directory and cursor state file
//! - [`LoggingConfig`] - local JSON file logging
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [fhir]
//! base_url = "https://fhir.example.com/r4"
//! bearer_token = "${STRATA_FHIR_TOKEN}"
//! page_size = 200
//!
//! [fhir.retry]
//! max_attempts = 5
//!
//! [mapping]
//! spec_dir = "mappings"
//! resource_types = ["Observation", "Patient"]
//!
//! [storage]
//! output_dir = "data/silver"
//! state_file = "data/state/cursors.json"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, load_config_str};
pub use schema::{
    ApplicationConfig, FhirConfig, LoggingConfig, MappingConfig, RateLimitConfig, RetryConfig,
    StorageConfig, StrataConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
