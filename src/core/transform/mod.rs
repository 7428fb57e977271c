//! Record transformation
//!
//! Every transformer, generic or custom, implements [`Transformer`] and is
//! driven through the same state machine ([`machine`]):
//!
//! ```text
//! INIT ──structural checks──▶ VALIDATED ──pre-hook, map, post-hook──▶ MAPPED
//!   ──schema enforcement──▶ ENFORCED ──provenance, business rules──▶ DONE
//! ```
//!
//! Any step may end in `FAILED`. A failure only affects its own record: it is
//! returned as a [`RejectedRecord`] and the rest of the batch proceeds.
//!
//! - [`generic`] - [`GenericMapper`], driven by a mapping specification
//! - [`custom`] - hand-written transformers (e.g. [`PatientTransformer`])
//! - [`hooks`] - pre/post hooks such as [`standardize_codes`]
//! - [`registry`] - [`TransformRegistry`] dispatch by resource type

pub mod custom;
pub mod generic;
pub mod hooks;
pub mod machine;
pub mod registry;

pub use custom::{builtin_transformers, PatientTransformer};
pub use generic::GenericMapper;
pub use hooks::{drop_narrative, standardize_codes, Hooks, MappedValues, PostHook, PreHook};
pub use machine::{transform_batch, transform_record, BatchOutcome, RejectedRecord, TransformOutcome, TransformStage};
pub use registry::{Resolution, TransformRegistry, TransformRegistryBuilder};

use crate::core::validation::{BusinessRule, ValidationResult};
use crate::domain::{Record, ResourceType, Result, TableSchema};
use chrono::{DateTime, Utc};

/// Output of a transformer's map step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapOutput {
    /// Column values keyed by column name
    pub values: MappedValues,
    /// Findings raised while mapping (empty columns, dropped extra values)
    pub findings: Vec<ValidationResult>,
}

/// Polymorphic transformer contract
///
/// Implementations must be pure: the same record always maps to the same
/// output, and nothing outside the returned value is modified.
pub trait Transformer: Send + Sync {
    /// Resource type this transformer accepts
    fn resource_type(&self) -> &ResourceType;

    /// Output schema, including the mapping version
    fn schema(&self) -> &TableSchema;

    /// Business rules applied to every produced row
    fn rules(&self) -> &[BusinessRule] {
        &[]
    }

    /// Adjust the record before mapping
    ///
    /// # Errors
    ///
    /// An error rejects the record as a mapping failure.
    fn pre_hook(&self, record: Record) -> Result<Record> {
        Ok(record)
    }

    /// Map a structurally valid record to column values
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Mapping`](crate::domain::StrataError::Mapping) when
    /// an expression cannot produce a storable value for this record.
    fn map(&self, record: &Record) -> Result<MapOutput>;

    /// Adjust mapped values before schema enforcement
    fn post_hook(&self, values: MappedValues) -> MappedValues {
        values
    }

    /// Run the full state machine for one record
    fn transform(&self, record: Record, extracted_at: DateTime<Utc>) -> TransformOutcome {
        transform_record(self, record, extracted_at)
    }
}
