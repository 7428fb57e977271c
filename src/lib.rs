// Strata - FHIR to tabular dataset ETL
// Copyright (c) 2025 Strata Contributors
// Licensed under the MIT License

//! # Strata - FHIR to flat, schema-pinned datasets
//!
//! Strata incrementally extracts FHIR resources from a server's search API and
//! flattens them into tabular rows, one table per resource type.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Extracting** resources page by page since a per-type watermark, with
//!   bounded retries and client-side rate limiting
//! - **Mapping** nested, polymorphic records to flat rows through declarative,
//!   versioned mapping specs or hand-written transformers
//! - **Validating** records structurally and rows against business rules
//! - **Committing** rows idempotently to a schema-pinned dataset, then advancing
//!   the cursor
//!
//! ## Architecture
//!
//! - [`core`] - Business logic (path language, mapping, transform, extract, write, pipeline)
//! - [`adapters`] - External integrations (FHIR client, dataset and state storage)
//! - [`domain`] - Core domain types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata::config::load_config;
//! use strata::core::pipeline::Pipeline;
//! use strata::logging::init_logging;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("strata.toml")?;
//!     let _guard = init_logging(&config.application.log_level, &config.logging)?;
//!
//!     let manifest = Pipeline::from_config(&config)?.run().await;
//!     println!("{}", manifest.to_json()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Mapping Specifications
//!
//! ```rust
//! use strata::core::mapping::MappingSpec;
//! use strata::core::transform::{GenericMapper, Transformer};
//! use strata::domain::Record;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn example() -> strata::domain::Result<()> {
//! let spec = MappingSpec::from_toml_str(r#"
//! resource_type = "Observation"
//! version = 1
//!
//! [[columns]]
//! name = "id"
//! path = "id"
//!
//! [[columns]]
//! name = "code"
//! path = "code.coding.first().code"
//! "#)?;
//!
//! let record = Record::new(json!({
//!     "resourceType": "Observation",
//!     "id": "42",
//!     "code": {"coding": [{"code": "8480-6"}]}
//! }));
//!
//! let outcome = GenericMapper::new(Arc::new(spec)).transform(record, chrono::Utc::now());
//! assert_eq!(outcome.row().unwrap().get("code"), Some(&json!("8480-6")));
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`domain::Result`]. Per-record failures never
//! surface as errors: they are collected as rejected records and counted in the
//! run manifest by [`domain::ErrorKind`].

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
