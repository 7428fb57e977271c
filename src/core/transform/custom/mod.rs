//! Hand-written transformers
//!
//! Custom transformers take precedence over mapping specs for their resource
//! type. Each declares its own [`TableSchema`](crate::domain::TableSchema) and
//! version.

pub mod patient;

pub use patient::{PatientTransformer, PATIENT_SCHEMA_VERSION};

use super::Transformer;
use std::sync::Arc;

/// Custom transformers registered by default
pub fn builtin_transformers() -> Vec<Arc<dyn Transformer>> {
    vec![Arc::new(PatientTransformer::new())]
}
