//! Core business logic for Strata.
//!
//! # Modules
//!
//! - [`path`] - path expression language (parser, evaluator, result cache)
//! - [`mapping`] - declarative mapping specifications and their loader
//! - [`validation`] - structural and business-rule checks
//! - [`transform`] - transformer contract, state machine, registry
//! - [`extract`] - paginated, retried, incremental extraction
//! - [`state`] - per-resource-type cursors
//! - [`write`] - schema-pinned, idempotent commits
//! - [`pipeline`] - run orchestration and the run manifest
//!
//! # Run Workflow
//!
//! For each resource type:
//!
//! 1. **Resolve**: pick a custom transformer or the generic mapper for its spec
//! 2. **Load State**: read the cursor; a missing cursor means a full extraction
//! 3. **Extract**: page through everything updated since the watermark
//! 4. **Transform**: validate, map and enforce the schema record by record
//! 5. **Commit**: append new rows, then advance the cursor
//! 6. **Report**: add the resource type's counts to the run manifest
//!
//! # Example
//!
//! ```rust,no_run
//! use strata::config::load_config;
//! use strata::core::pipeline::Pipeline;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("strata.toml")?;
//! let pipeline = Pipeline::from_config(&config)?;
//!
//! let manifest = pipeline.run().await;
//! println!("{}: {} rows written", manifest.status(), manifest.total_written());
//! # Ok(())
//! # }
//! ```

pub mod extract;
pub mod mapping;
pub mod path;
pub mod pipeline;
pub mod state;
pub mod transform;
pub mod validation;
pub mod write;
